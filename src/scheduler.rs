//! Refresh scheduling: one early tick, then a fixed cadence until stopped.
//!
//! Each tick starts a cycle as its own task. Whether a tick may start a cycle
//! while the previous one is still awaiting its quote batch is decided by
//! [`OverlapPolicy`]. Stopping cancels the timers only; a cycle already
//! running is left to finish. Pausing ignores ticks until resumed; resuming
//! runs a cycle at once and restarts the cadence from there.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

/// What a tick does when the previous cycle has not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlapPolicy {
    /// Start another cycle regardless. Stores are last-writer-wins, so a slow
    /// older cycle may overwrite quotes from a newer one.
    #[default]
    Allow,
    /// Skip the tick while a cycle is in flight.
    SingleFlight,
}

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub overlap: OverlapPolicy,
    /// Start with automatic ticks paused
    pub paused: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(4),
            overlap: OverlapPolicy::Allow,
            paused: false,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("refresh interval must be greater than zero")]
    ZeroInterval,
}

/// Seconds from configuration as a duration. Negative, non-finite and
/// unrepresentable values give zero.
pub fn duration_from_secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// Tick accounting, readable while the scheduler runs.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub started: AtomicU64,
    pub skipped: AtomicU64,
}

/// Clears the in-flight flag when the cycle task ends, panics included.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Control side of a running scheduler.
pub struct SchedulerHandle {
    stop_tx: watch::Sender<bool>,
    pause_tx: watch::Sender<bool>,
    trigger: Arc<Notify>,
    stats: Arc<SchedulerStats>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel the initial and periodic timers. In-flight cycles complete.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Ignore timer ticks until [`resume`](Self::resume). Manual triggers still run.
    pub fn pause(&self) {
        self.set_paused(true);
    }

    /// Run a cycle now and restart the cadence from here.
    pub fn resume(&self) {
        self.set_paused(false);
    }

    pub fn set_paused(&self, paused: bool) {
        self.pause_tx.send_if_modified(|current| {
            let changed = *current != paused;
            *current = paused;
            changed
        });
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }

    /// Ask for an extra cycle now, subject to the overlap policy.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn started(&self) -> u64 {
        self.stats.started.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.stats.skipped.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop and wait for the timer task to exit.
    pub async fn shutdown(self) {
        self.stop();
        let _ = self.task.await;
    }
}

pub struct Scheduler;

impl Scheduler {
    /// Spawn the timer task. `job` produces one refresh cycle per call.
    pub fn start<F, Fut>(config: SchedulerConfig, job: F) -> Result<SchedulerHandle, SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if config.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (pause_tx, mut pause_rx) = watch::channel(config.paused);
        let trigger = Arc::new(Notify::new());
        let stats = Arc::new(SchedulerStats::default());
        let in_flight = Arc::new(AtomicBool::new(false));

        let task = {
            let trigger = Arc::clone(&trigger);
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                let first = Instant::now() + config.initial_delay;
                let mut ticker = tokio::time::interval_at(first, config.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                info!(
                    initial_delay = ?config.initial_delay,
                    interval = ?config.interval,
                    overlap = ?config.overlap,
                    paused = config.paused,
                    "scheduler started"
                );

                loop {
                    tokio::select! {
                        biased;
                        // A dropped handle counts as a stop request
                        _ = stop_rx.changed() => break,
                        _ = pause_rx.changed() => {
                            if *pause_rx.borrow_and_update() {
                                info!("scheduler paused");
                                continue;
                            }
                            info!("scheduler resumed");
                            ticker.reset();
                        }
                        _ = ticker.tick() => {
                            if *pause_rx.borrow() {
                                debug!("paused, tick ignored");
                                continue;
                            }
                        }
                        _ = trigger.notified() => {}
                    }

                    if config.overlap == OverlapPolicy::SingleFlight
                        && in_flight.swap(true, Ordering::AcqRel)
                    {
                        stats.skipped.fetch_add(1, Ordering::Relaxed);
                        debug!("previous cycle still running, tick skipped");
                        continue;
                    }

                    stats.started.fetch_add(1, Ordering::Relaxed);
                    let cycle = job();
                    let guard = (config.overlap == OverlapPolicy::SingleFlight)
                        .then(|| InFlight(Arc::clone(&in_flight)));
                    tokio::spawn(async move {
                        cycle.await;
                        drop(guard);
                    });
                }

                info!("scheduler stopped");
            })
        };

        Ok(SchedulerHandle {
            stop_tx,
            pause_tx,
            trigger,
            stats,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    fn config(overlap: OverlapPolicy) -> SchedulerConfig {
        SchedulerConfig {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(4),
            overlap,
            paused: false,
        }
    }

    /// A job that counts starts and finishes and takes `work` to complete.
    fn counting_job(
        work: Duration,
    ) -> (
        Arc<AtomicUsize>,
        Arc<AtomicUsize>,
        impl Fn() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
    ) {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let (s, f) = (Arc::clone(&started), Arc::clone(&finished));
        let job = move || {
            let (s, f) = (Arc::clone(&s), Arc::clone(&f));
            Box::pin(async move {
                s.fetch_add(1, Ordering::SeqCst);
                sleep(work).await;
                f.fetch_add(1, Ordering::SeqCst);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (started, finished, job)
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_first_tick_then_fixed_interval() {
        let (started, _, job) = counting_job(Duration::ZERO);
        let handle = Scheduler::start(config(OverlapPolicy::Allow), job).unwrap();

        sleep(Duration::from_millis(900)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(4)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);

        sleep(Duration::from_secs(8)).await;
        assert_eq!(started.load(Ordering::SeqCst), 4);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick_cancels_everything() {
        let (started, _, job) = counting_job(Duration::ZERO);
        let handle = Scheduler::start(config(OverlapPolicy::Allow), job).unwrap();

        sleep(Duration::from_millis(500)).await;
        handle.stop();
        sleep(Duration::from_secs(20)).await;

        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_cycle_finish() {
        let (started, finished, job) = counting_job(Duration::from_secs(2));
        let handle = Scheduler::start(config(OverlapPolicy::Allow), job).unwrap();

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        handle.shutdown().await;

        sleep(Duration::from_secs(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_allow_overlaps_slow_cycles() {
        let (started, finished, job) = counting_job(Duration::from_secs(10));
        let handle = Scheduler::start(config(OverlapPolicy::Allow), job).unwrap();

        // Ticks at 1s, 5s and 9s all start while the first is still running
        sleep(Duration::from_secs(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 3);
        assert_eq!(finished.load(Ordering::SeqCst), 0);
        assert_eq!(handle.skipped(), 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_skips_ticks_while_busy() {
        let (started, _, job) = counting_job(Duration::from_secs(10));
        let handle = Scheduler::start(config(OverlapPolicy::SingleFlight), job).unwrap();

        // First cycle runs 1s..11s, so the 5s and 9s ticks are skipped
        sleep(Duration::from_secs(12)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(handle.skipped(), 2);

        // The 13s tick finds the slot free again
        sleep(Duration::from_secs(2)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert_eq!(handle.started(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_runs_extra_cycle() {
        let (started, _, job) = counting_job(Duration::ZERO);
        let handle = Scheduler::start(config(OverlapPolicy::Allow), job).unwrap();

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        handle.trigger();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_interval_is_refused() {
        let (_, _, job) = counting_job(Duration::ZERO);
        let mut cfg = config(OverlapPolicy::Allow);
        cfg.interval = duration_from_secs(f64::INFINITY);
        assert!(matches!(
            Scheduler::start(cfg, job),
            Err(SchedulerError::ZeroInterval)
        ));
    }

    #[test]
    fn test_duration_from_secs_rejects_unrepresentable_values() {
        assert_eq!(duration_from_secs(2.5), Duration::from_millis(2500));
        assert_eq!(duration_from_secs(0.0), Duration::ZERO);
        assert_eq!(duration_from_secs(-1.0), Duration::ZERO);
        assert_eq!(duration_from_secs(f64::NAN), Duration::ZERO);
        assert_eq!(duration_from_secs(f64::INFINITY), Duration::ZERO);
        assert_eq!(duration_from_secs(1e30), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_ignores_ticks_until_resumed() {
        let (started, _, job) = counting_job(Duration::ZERO);
        let handle = Scheduler::start(config(OverlapPolicy::Allow), job).unwrap();

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        handle.pause();
        assert!(handle.is_paused());
        sleep(Duration::from_secs(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // Resuming runs a cycle straight away, then one interval later
        handle.resume();
        assert!(!handle.is_paused());
        sleep(Duration::from_millis(100)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        sleep(Duration::from_secs(4)).await;
        assert_eq!(started.load(Ordering::SeqCst), 3);
        assert_eq!(handle.skipped(), 0);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_paused_still_accepts_triggers() {
        let (started, _, job) = counting_job(Duration::ZERO);
        let mut cfg = config(OverlapPolicy::Allow);
        cfg.paused = true;
        let handle = Scheduler::start(cfg, job).unwrap();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);

        handle.trigger();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // Pausing twice is harmless; resume still fires once
        handle.pause();
        handle.resume();
        sleep(Duration::from_millis(100)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);

        handle.shutdown().await;
    }
}
