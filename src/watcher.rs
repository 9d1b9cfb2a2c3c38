use std::time::{Duration, Instant};

use chrono::Local;
use crossbeam_channel::{Receiver, at, select, tick};
use log::{info, warn};

use crate::clock::Clock;
use crate::config::WatchConfig;
use crate::control::ServiceControl;
use crate::cycle::{CycleOutcome, WatchCycle};
use crate::notify::NotificationSink;
use crate::probe::Prober;

/// How often termination signals are polled while idle.
const SIGNAL_POLL: Duration = Duration::from_millis(200);

/// Fixed-period tick schedule.
///
/// Each tick is due one period after the previous *scheduled* tick, not after
/// the previous cycle finished. Ticks whose time passed while a cycle was
/// still running are skipped rather than queued.
#[derive(Debug, Clone, Copy)]
pub struct TickSchedule {
    period: Duration,
    next_due: Instant,
}

impl TickSchedule {
    /// First tick is due one period after `start`.
    pub fn starting_at(start: Instant, period: Duration) -> Self {
        Self {
            period,
            next_due: start + period,
        }
    }

    pub fn next_due(&self) -> Instant {
        self.next_due
    }

    /// Move past the tick that just ran, given the time the cycle finished.
    /// Returns how many scheduled ticks were skipped because they fell due
    /// while the cycle was running.
    pub fn advance(&mut self, now: Instant) -> u32 {
        self.next_due += self.period;
        let mut skipped = 0;
        while self.next_due < now {
            self.next_due += self.period;
            skipped += 1;
        }
        skipped
    }
}

/// Owns the collaborators and drives watch cycles on a fixed schedule.
pub struct Watcher {
    config: WatchConfig,
    prober: Box<dyn Prober>,
    control: Box<dyn ServiceControl>,
    clock: Box<dyn Clock>,
    sink: NotificationSink,
}

impl Watcher {
    pub fn new(
        config: WatchConfig,
        prober: Box<dyn Prober>,
        control: Box<dyn ServiceControl>,
        clock: Box<dyn Clock>,
        sink: NotificationSink,
    ) -> Self {
        Self {
            config,
            prober,
            control,
            clock,
            sink,
        }
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    pub fn sink_mut(&mut self) -> &mut NotificationSink {
        &mut self.sink
    }

    /// Run one cycle now.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        let started = Instant::now();
        let outcome = WatchCycle::new(
            &self.config,
            self.prober.as_ref(),
            self.control.as_ref(),
            self.clock.as_ref(),
            &mut self.sink,
        )
        .run(Local::now());
        info!(
            "Watch cycle for {} finished in {:?}: {outcome}",
            self.config.target_url,
            started.elapsed()
        );
        outcome
    }

    /// Event loop. Runs cycles every poll interval until `shutdown` receives
    /// or disconnects, or a termination signal arrives. Both are only noticed
    /// between cycles.
    pub fn run(mut self, shutdown: &Receiver<()>) {
        let period = self.config.poll_interval();
        let mut schedule = TickSchedule::starting_at(Instant::now(), period);
        let sig_tick = tick(SIGNAL_POLL);

        info!(
            "Watching {} every {period:?} (service '{}', {} attempts)",
            self.config.target_url, self.config.service_name, self.config.max_retries
        );

        loop {
            select! {
                recv(shutdown) -> _ => {
                    info!("shutdown requested – no further cycles");
                    break;
                }
                recv(sig_tick) -> _ => {
                    if let Some(sig) = crate::signals::check() {
                        info!("signal {sig} – orderly shutdown");
                        break;
                    }
                }
                recv(at(schedule.next_due())) -> _ => {
                    let outcome = self.run_cycle();
                    let skipped = schedule.advance(Instant::now());
                    if skipped > 0 {
                        warn!(
                            "Cycle ({outcome}) outran the {period:?} poll interval; skipped {skipped} tick(s)"
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use crossbeam_channel::bounded;

    use super::*;
    use crate::clock::SystemClock;
    use crate::control::{ControlError, ServiceState};
    use crate::notify::{MailError, Mailer, SinkSettings};
    use crate::probe::ProbeResult;

    #[test]
    fn ticks_follow_scheduled_times_not_cycle_end() {
        let start = Instant::now();
        let period = Duration::from_secs(10);
        let mut schedule = TickSchedule::starting_at(start, period);
        assert_eq!(schedule.next_due(), start + period);

        // The first cycle took 3s; the next tick stays on the 10s grid.
        let skipped = schedule.advance(start + period + Duration::from_secs(3));
        assert_eq!(skipped, 0);
        assert_eq!(schedule.next_due(), start + period * 2);
    }

    #[test]
    fn overrunning_cycle_skips_missed_ticks() {
        let start = Instant::now();
        let period = Duration::from_secs(10);
        let mut schedule = TickSchedule::starting_at(start, period);

        // Cycle that started at t=10 ran until t=35: ticks at 20 and 30 are dropped.
        let skipped = schedule.advance(start + Duration::from_secs(35));
        assert_eq!(skipped, 2);
        assert_eq!(schedule.next_due(), start + Duration::from_secs(40));
    }

    #[test]
    fn tick_due_exactly_at_cycle_end_is_kept() {
        let start = Instant::now();
        let period = Duration::from_secs(10);
        let mut schedule = TickSchedule::starting_at(start, period);
        assert_eq!(schedule.advance(start + Duration::from_secs(20)), 0);
        assert_eq!(schedule.next_due(), start + Duration::from_secs(20));
    }

    struct CountingProber(Arc<AtomicUsize>);

    impl Prober for CountingProber {
        fn probe(&self, _url: &str, _timeout: Duration) -> ProbeResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            ProbeResult::success(200, 2, 2)
        }
    }

    struct NeverRestart;

    impl ServiceControl for NeverRestart {
        fn stop(&self, service: &str) -> Result<(), ControlError> {
            Err(ControlError::UnknownService(service.to_string()))
        }
        fn start(&self, service: &str) -> Result<(), ControlError> {
            Err(ControlError::UnknownService(service.to_string()))
        }
        fn query(&self, service: &str) -> Result<ServiceState, ControlError> {
            Err(ControlError::UnknownService(service.to_string()))
        }
    }

    struct NoMail;

    impl Mailer for NoMail {
        fn send(&self, _: &str, _: &str) -> Result<(), MailError> {
            Ok(())
        }
    }

    fn watcher(poll_interval_ms: u64, probes: Arc<AtomicUsize>) -> Watcher {
        let config = WatchConfig {
            poll_interval_ms,
            ..WatchConfig::default()
        };
        Watcher::new(
            config,
            Box::new(CountingProber(probes)),
            Box::new(NeverRestart),
            Box::new(SystemClock),
            NotificationSink::new(SinkSettings::default(), Box::new(NoMail)),
        )
    }

    #[test]
    fn run_cycle_reports_outcome() {
        let probes = Arc::new(AtomicUsize::new(0));
        let mut w = watcher(1_000, probes.clone());
        assert_eq!(w.run_cycle(), CycleOutcome::Healthy);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
        assert!(w.sink_mut().buffered().is_empty());
    }

    #[test]
    fn loop_runs_on_schedule_until_shutdown() {
        let probes = Arc::new(AtomicUsize::new(0));
        let w = watcher(40, probes.clone());
        let (tx, rx) = bounded::<()>(1);
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(230));
            tx.send(()).ok();
        });

        w.run(&rx);
        stopper.join().unwrap();

        // First tick at 40ms, then every 40ms: about five cycles in 230ms.
        let n = probes.load(Ordering::SeqCst);
        assert!((2..=6).contains(&n), "unexpected cycle count {n}");
    }

    #[test]
    fn no_cycle_before_first_period() {
        let probes = Arc::new(AtomicUsize::new(0));
        let w = watcher(60_000, probes.clone());
        let (tx, rx) = bounded::<()>(1);
        tx.send(()).unwrap();
        w.run(&rx);
        assert_eq!(probes.load(Ordering::SeqCst), 0);
    }
}
