//! Service control for the watched service - delegates to OS-native managers
//!
//! Provides a unified interface for stopping and starting a named service:
//! - macOS: launchd (launchctl)
//! - Linux: systemd (systemctl)
//! - Windows: Service Control Manager (Windows API)
//!
//! [`restart`] layers the shared-deadline policy on top of the primitive.

use std::time::{Duration, Instant};

use crate::clock::Clock;

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        mod macos_control;
        use macos_control as platform;
    } else if #[cfg(target_os = "linux")] {
        mod linux_control;
        use linux_control as platform;
    } else if #[cfg(target_os = "windows")] {
        mod windows_control;
        use windows_control as platform;
    } else {
        mod unsupported_control;
        use unsupported_control as platform;
    }
}

pub use platform::SystemServiceControl;

/// Interval between state queries while waiting for a transition.
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Running,
    Stopped,
    /// Starting, stopping, reloading or any other in-between state.
    Transitioning,
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("unknown service '{0}'")]
    UnknownService(String),
    #[error("failed to execute {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{action} of '{service}' failed: {detail}")]
    Command {
        action: &'static str,
        service: String,
        detail: String,
    },
    #[error("'{service}' did not reach {desired:?} within {timeout:?}")]
    Timeout {
        service: String,
        desired: ServiceState,
        timeout: Duration,
    },
    #[error("service control is not supported on this platform")]
    Unsupported,
}

/// Stop/start/query primitive for a named OS service.
pub trait ServiceControl {
    /// Request a stop. Does not wait for the service to reach `Stopped`.
    fn stop(&self, service: &str) -> Result<(), ControlError>;

    /// Request a start. Does not wait for the service to reach `Running`.
    fn start(&self, service: &str) -> Result<(), ControlError>;

    fn query(&self, service: &str) -> Result<ServiceState, ControlError>;

    /// Poll [`ServiceControl::query`] until `desired` is observed or `timeout`
    /// passes. The state is always checked at least once.
    fn wait_for_state(
        &self,
        service: &str,
        desired: ServiceState,
        timeout: Duration,
    ) -> Result<(), ControlError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.query(service)? == desired {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ControlError::Timeout {
                    service: service.to_string(),
                    desired,
                    timeout,
                });
            }
            std::thread::sleep(STATE_POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Stop then start `service` within one shared budget.
///
/// The stop phase may consume the whole budget; the start phase gets what is
/// left, floored at zero. With nothing left the start is still requested but
/// the wait counts as an immediate timeout. A refused stop of a service that
/// is already stopped is not a failure. Every other failure maps to `false`.
pub fn restart(
    control: &dyn ServiceControl,
    clock: &dyn Clock,
    service: &str,
    total_timeout: Duration,
) -> bool {
    let started = clock.now();

    if let Err(e) = control.stop(service) {
        if !matches!(control.query(service), Ok(ServiceState::Stopped)) {
            log::warn!("Stopping {service} failed: {e}");
            return false;
        }
        log::info!("{service} was already stopped ({e}); starting it");
    }
    if let Err(e) = control.wait_for_state(service, ServiceState::Stopped, total_timeout) {
        log::warn!("Waiting for {service} to stop failed: {e}");
        return false;
    }

    let elapsed = clock.now().saturating_duration_since(started);
    let remaining = total_timeout.saturating_sub(elapsed);
    log::debug!("{service} stopped after {elapsed:?}; {remaining:?} left to start it");

    if let Err(e) = control.start(service) {
        log::warn!("Starting {service} failed: {e}");
        return false;
    }
    if remaining.is_zero() {
        log::warn!("No time left in the {total_timeout:?} restart budget to wait for {service}");
        return false;
    }
    if let Err(e) = control.wait_for_state(service, ServiceState::Running, remaining) {
        log::warn!("Waiting for {service} to start failed: {e}");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::clock::ManualClock;

    /// Fake service whose stop and start take a fixed amount of virtual time.
    struct SlowService<'a> {
        clock: &'a ManualClock,
        stop_takes: Duration,
        start_takes: Duration,
        calls: RefCell<Vec<String>>,
        known: bool,
    }

    impl<'a> SlowService<'a> {
        fn new(clock: &'a ManualClock, stop_ms: u64, start_ms: u64) -> Self {
            Self {
                clock,
                stop_takes: Duration::from_millis(stop_ms),
                start_takes: Duration::from_millis(start_ms),
                calls: RefCell::new(Vec::new()),
                known: true,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl ServiceControl for SlowService<'_> {
        fn stop(&self, service: &str) -> Result<(), ControlError> {
            if !self.known {
                return Err(ControlError::UnknownService(service.to_string()));
            }
            self.calls.borrow_mut().push("stop".into());
            Ok(())
        }

        fn start(&self, _service: &str) -> Result<(), ControlError> {
            self.calls.borrow_mut().push("start".into());
            Ok(())
        }

        fn query(&self, _service: &str) -> Result<ServiceState, ControlError> {
            Ok(ServiceState::Transitioning)
        }

        fn wait_for_state(
            &self,
            service: &str,
            desired: ServiceState,
            timeout: Duration,
        ) -> Result<(), ControlError> {
            self.calls
                .borrow_mut()
                .push(format!("wait {desired:?} {}ms", timeout.as_millis()));
            let takes = match desired {
                ServiceState::Stopped => self.stop_takes,
                _ => self.start_takes,
            };
            if takes > timeout {
                self.clock.advance(timeout);
                return Err(ControlError::Timeout {
                    service: service.to_string(),
                    desired,
                    timeout,
                });
            }
            self.clock.advance(takes);
            Ok(())
        }
    }

    #[test]
    fn start_phase_gets_the_remaining_budget() {
        let clock = ManualClock::new();
        let svc = SlowService::new(&clock, 12_000, 5_000);
        assert!(restart(&svc, &clock, "web", Duration::from_secs(30)));
        assert_eq!(
            svc.calls(),
            vec!["stop", "wait Stopped 30000ms", "start", "wait Running 18000ms"]
        );
    }

    #[test]
    fn slow_stop_starves_the_start_phase() {
        let clock = ManualClock::new();
        // Stop completes exactly on the deadline.
        let svc = SlowService::new(&clock, 30_000, 1);
        assert!(!restart(&svc, &clock, "web", Duration::from_secs(30)));
        // Start is still requested, but never waited on with a zero budget.
        assert_eq!(svc.calls(), vec!["stop", "wait Stopped 30000ms", "start"]);
    }

    #[test]
    fn start_that_outlasts_the_remainder_fails() {
        let clock = ManualClock::new();
        let svc = SlowService::new(&clock, 25_000, 10_000);
        assert!(!restart(&svc, &clock, "web", Duration::from_secs(30)));
        assert_eq!(clock.elapsed(), Duration::from_secs(30));
    }

    #[test]
    fn stop_timeout_fails_without_starting() {
        let clock = ManualClock::new();
        let svc = SlowService::new(&clock, 60_000, 1);
        assert!(!restart(&svc, &clock, "web", Duration::from_secs(30)));
        assert_eq!(svc.calls(), vec!["stop", "wait Stopped 30000ms"]);
    }

    #[test]
    fn unknown_service_returns_false() {
        let clock = ManualClock::new();
        let mut svc = SlowService::new(&clock, 1, 1);
        svc.known = false;
        assert!(!restart(&svc, &clock, "nope", Duration::from_secs(30)));
        assert!(svc.calls().is_empty());
    }

    /// A service that already crashed: stop is refused, the state is Stopped.
    struct Crashed {
        started: RefCell<bool>,
    }

    impl ServiceControl for Crashed {
        fn stop(&self, service: &str) -> Result<(), ControlError> {
            Err(ControlError::Command {
                action: "stop",
                service: service.to_string(),
                detail: "The service has not been started.".into(),
            })
        }
        fn start(&self, _: &str) -> Result<(), ControlError> {
            *self.started.borrow_mut() = true;
            Ok(())
        }
        fn query(&self, _: &str) -> Result<ServiceState, ControlError> {
            Ok(if *self.started.borrow() {
                ServiceState::Running
            } else {
                ServiceState::Stopped
            })
        }
    }

    #[test]
    fn already_stopped_service_is_started() {
        let clock = ManualClock::new();
        let svc = Crashed {
            started: RefCell::new(false),
        };
        assert!(restart(&svc, &clock, "web", Duration::from_secs(30)));
        assert!(*svc.started.borrow());
    }

    #[test]
    fn refused_stop_of_a_running_service_fails() {
        let clock = ManualClock::new();
        let running = FixedState(ServiceState::Running);
        struct RefusesStop(FixedState);
        impl ServiceControl for RefusesStop {
            fn stop(&self, service: &str) -> Result<(), ControlError> {
                Err(ControlError::Command {
                    action: "stop",
                    service: service.to_string(),
                    detail: "access denied".into(),
                })
            }
            fn start(&self, s: &str) -> Result<(), ControlError> {
                self.0.start(s)
            }
            fn query(&self, s: &str) -> Result<ServiceState, ControlError> {
                self.0.query(s)
            }
        }
        assert!(!restart(&RefusesStop(running), &clock, "web", Duration::from_secs(30)));
    }

    struct FixedState(ServiceState);

    impl ServiceControl for FixedState {
        fn stop(&self, _: &str) -> Result<(), ControlError> {
            Ok(())
        }
        fn start(&self, _: &str) -> Result<(), ControlError> {
            Ok(())
        }
        fn query(&self, _: &str) -> Result<ServiceState, ControlError> {
            Ok(self.0)
        }
    }

    #[test]
    fn default_wait_checks_once_even_with_zero_timeout() {
        let running = FixedState(ServiceState::Running);
        assert!(
            running
                .wait_for_state("web", ServiceState::Running, Duration::ZERO)
                .is_ok()
        );
        let stuck = FixedState(ServiceState::Transitioning);
        let err = stuck
            .wait_for_state("web", ServiceState::Stopped, Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, ControlError::Timeout { .. }));
    }
}
