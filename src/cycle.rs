//! The watch cycle: probe with retries, restart on sustained failure, verify
//! recovery, and leave a trail of notifications for the sink to flush.
//!
//! A cycle is an explicit state machine. [`WatchCycle::step`] performs the
//! work of one state and returns the next; [`WatchCycle::run`] drives it from
//! `Probing(1)` to `Done`. Nothing survives from one cycle to the next.
//!
//! ```text
//! Probing(1..N) ──ok──────────────────────────────────────────▶ Done(Healthy)
//!      │ all N failed
//!      ▼
//! RestartDecision ─▶ Restarting ──fail──────────────────────▶ Done(RestartFailed)
//!                        │ ok
//!                        ▼
//!                 Verifying(1..N) ──ok──────────────────────▶ Done(Recovered)
//!                        │ timeout ─────────────────────────▶ Done(VerificationAbandoned)
//!                        │ all N failed ────────────────────▶ Done(Offline)
//! ```
//!
//! The two probing loops treat timeouts differently on purpose: the initial
//! loop keeps retrying through timeouts, verification gives up on the first
//! one.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::clock::Clock;
use crate::config::WatchConfig;
use crate::control::{self, ServiceControl};
use crate::notify::{NotificationSink, Severity};
use crate::probe::{ProbeResult, ProbeStatus, Prober};

/// Pause between failed attempts of the initial probing loop. Not counted
/// against the probe timeout.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Pause before every verification attempt, including the first.
pub const VERIFY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Probing { attempt: u32 },
    RestartDecision,
    Restarting,
    Verifying { attempt: u32 },
    Done(CycleOutcome),
}

/// How a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The endpoint answered; nothing was restarted.
    Healthy,
    /// The service was restarted and the endpoint answered afterwards.
    Recovered,
    /// The restart itself failed.
    RestartFailed,
    /// The service was restarted, then a verification probe timed out.
    VerificationAbandoned,
    /// The service was restarted and the endpoint still does not answer.
    Offline,
}

impl CycleOutcome {
    /// Whether the endpoint was answering when the cycle ended.
    pub fn is_up(self) -> bool {
        matches!(self, CycleOutcome::Healthy | CycleOutcome::Recovered)
    }

    pub fn restarted(self) -> bool {
        !matches!(self, CycleOutcome::Healthy | CycleOutcome::RestartFailed)
    }
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CycleOutcome::Healthy => "healthy",
            CycleOutcome::Recovered => "recovered after restart",
            CycleOutcome::RestartFailed => "restart failed",
            CycleOutcome::VerificationAbandoned => "verification abandoned after timeout",
            CycleOutcome::Offline => "offline after restart",
        })
    }
}

/// One watch cycle over borrowed collaborators.
pub struct WatchCycle<'a> {
    config: &'a WatchConfig,
    prober: &'a dyn Prober,
    control: &'a dyn ServiceControl,
    clock: &'a dyn Clock,
    sink: &'a mut NotificationSink,
}

impl<'a> WatchCycle<'a> {
    pub fn new(
        config: &'a WatchConfig,
        prober: &'a dyn Prober,
        control: &'a dyn ServiceControl,
        clock: &'a dyn Clock,
        sink: &'a mut NotificationSink,
    ) -> Self {
        Self {
            config,
            prober,
            control,
            clock,
            sink,
        }
    }

    /// Run the cycle to completion.
    pub fn run(mut self, triggered_at: DateTime<Local>) -> CycleOutcome {
        self.sink.record(
            Severity::Notice,
            format!("Cycle triggered at {}", triggered_at.format("%Y-%m-%d %H:%M:%S")),
        );

        let mut phase = CyclePhase::Probing { attempt: 1 };
        loop {
            match phase {
                CyclePhase::Done(outcome) => return outcome,
                _ => phase = self.step(phase),
            }
        }
    }

    /// Perform the work of `phase` and return the phase that follows it.
    pub fn step(&mut self, phase: CyclePhase) -> CyclePhase {
        match phase {
            CyclePhase::Probing { attempt } => self.probing(attempt),
            CyclePhase::RestartDecision => {
                self.sink.record(
                    Severity::Error,
                    format!("Failed to respond after {} attempts", self.max_retries()),
                );
                self.sink.record(Severity::Notice, "Restarting service");
                CyclePhase::Restarting
            }
            CyclePhase::Restarting => self.restarting(),
            CyclePhase::Verifying { attempt } => self.verifying(attempt),
            CyclePhase::Done(outcome) => CyclePhase::Done(outcome),
        }
    }

    fn max_retries(&self) -> u32 {
        self.config.max_retries.max(1)
    }

    fn probing(&mut self, attempt: u32) -> CyclePhase {
        let result = self.attempt_probe(attempt);
        if result.is_ok() {
            self.record_ok(&result);
            return self.finish(CycleOutcome::Healthy);
        }

        self.record_failure(&result);
        if attempt < self.max_retries() {
            self.clock.sleep(RETRY_DELAY);
            CyclePhase::Probing {
                attempt: attempt + 1,
            }
        } else {
            CyclePhase::RestartDecision
        }
    }

    fn restarting(&mut self) -> CyclePhase {
        let service = &self.config.service_name;
        if !control::restart(self.control, self.clock, service, self.config.restart_timeout()) {
            let detail = format!(
                "URL '{}' failed to respond after {} attempts\n\
                 Service '{}' could not be restarted!\n\n\n\
                 ATTENTION REQUIRED!",
                self.config.target_url,
                self.max_retries(),
                service
            );
            self.sink
                .record_detail(Severity::Error, "Failed to restart service", detail);
            return self.finish(CycleOutcome::RestartFailed);
        }

        self.sink
            .record(Severity::Message, "Service restarted successfully");
        self.sink
            .record(Severity::Notice, "Pausing before re-verification");
        CyclePhase::Verifying { attempt: 1 }
    }

    fn verifying(&mut self, attempt: u32) -> CyclePhase {
        self.clock.sleep(VERIFY_DELAY);
        let result = self.attempt_probe(attempt);

        if result.is_ok() {
            self.record_ok(&result);
            let detail = format!(
                "URL '{}' failed to respond after {} attempts\n\
                 Service '{}' was restarted.\n\n\n\
                 Response was okay after service restart!",
                self.config.target_url,
                self.max_retries(),
                self.config.service_name
            );
            self.sink
                .record_detail(Severity::Error, "Service restart was required", detail);
            return self.finish(CycleOutcome::Recovered);
        }

        if result.status == ProbeStatus::Timeout {
            self.record_failure(&result);
            return self.finish(CycleOutcome::VerificationAbandoned);
        }

        self.record_failure(&result);
        if attempt < self.max_retries() {
            return CyclePhase::Verifying {
                attempt: attempt + 1,
            };
        }

        let detail = format!(
            "URL '{}' failed to respond after {} attempts\n\
             Service '{}' was restarted!\n\n\n\
             Response still FAILED after service restart!\n\n\n\
             ATTENTION REQUIRED!",
            self.config.target_url,
            self.max_retries(),
            self.config.service_name
        );
        self.sink
            .record_detail(Severity::Error, "Web server is offline", detail);
        self.finish(CycleOutcome::Offline)
    }

    fn attempt_probe(&mut self, attempt: u32) -> ProbeResult {
        self.sink.record(
            Severity::Notice,
            format!("Testing attempt {attempt}/{}", self.max_retries()),
        );
        self.prober
            .probe(&self.config.target_url, self.config.probe_timeout())
    }

    fn record_ok(&mut self, result: &ProbeResult) {
        self.sink.record(
            Severity::Message,
            format!(
                "Response okay! Length: {}; Expected: {}",
                result.received_length, result.declared_length
            ),
        );
    }

    fn record_failure(&mut self, result: &ProbeResult) {
        if result.status == ProbeStatus::Timeout {
            self.sink.record(Severity::Warning, "Response timed out");
            return;
        }
        let code = result
            .http_status
            .map_or_else(|| "none".to_string(), |c| c.to_string());
        self.sink.record(
            Severity::Warning,
            format!("Response failure! Status: {}; Code: {code}", result.status),
        );
    }

    fn finish(&mut self, outcome: CycleOutcome) -> CyclePhase {
        self.sink.flush();
        CyclePhase::Done(outcome)
    }
}
