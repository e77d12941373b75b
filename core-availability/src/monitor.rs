//! Periodic re-classification of date-gated tracks.
//!
//! The monitor is an owned object with an explicit start/stop lifecycle. It
//! ticks on a fixed cadence, asks its target to re-classify against the
//! clock's current day, and goes idle by itself once the target reports that
//! nothing gated remains.

use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_runtime::events::{AvailabilityEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Something holding tracks whose availability can change over time.
#[async_trait]
pub trait AvailabilityTarget: Send + Sync {
    /// Re-classify every track against `today` without re-decrypting.
    ///
    /// Returns how many tracks can still change status (locked, or unlocked
    /// with an end date).
    async fn refresh_availability(&self, today: chrono::NaiveDate) -> usize;
}

struct MonitorTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Re-evaluation cadence for availability windows.
pub struct AvailabilityMonitor {
    interval: Duration,
    clock: Arc<dyn Clock>,
    events: EventBus,
    task: Mutex<Option<MonitorTask>>,
}

impl AvailabilityMonitor {
    pub fn new(interval: Duration, clock: Arc<dyn Clock>, events: EventBus) -> Self {
        Self {
            interval,
            clock,
            events,
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start ticking against `target`, replacing any previous run.
    ///
    /// The first check happens one interval after the call; callers classify
    /// at ingest time themselves. Must be called from within a tokio runtime.
    pub fn start(&self, target: Arc<dyn AvailabilityTarget>) {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::run(
            self.interval,
            Arc::clone(&self.clock),
            self.events.clone(),
            target,
            cancel.clone(),
        ));

        let previous = self.task.lock().replace(MonitorTask { cancel, handle });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        debug!(interval_secs = self.interval.as_secs(), "Availability monitor started");
    }

    /// Stop ticking. No-op when not running.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.cancel.cancel();
            debug!("Availability monitor stopped");
        }
    }

    /// `true` while a started loop has neither been stopped nor gone idle.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map_or(false, |task| !task.handle.is_finished())
    }

    async fn run(
        period: Duration,
        clock: Arc<dyn Clock>,
        events: EventBus,
        target: Arc<dyn AvailabilityTarget>,
        cancel: CancellationToken,
    ) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let today = clock.today();
                    let gated = target.refresh_availability(today).await;
                    debug!(%today, gated, "Availability re-checked");

                    if gated == 0 {
                        info!("No gated tracks remain; availability monitor idle");
                        let _ = events.emit(CoreEvent::Availability(AvailabilityEvent::MonitorIdle));
                        break;
                    }
                }
            }
        }
    }
}

impl Drop for AvailabilityMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for AvailabilityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityMonitor")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::FixedClock;
    use chrono::NaiveDate;
    use std::collections::VecDeque;

    struct ScriptedTarget {
        remaining: Mutex<VecDeque<usize>>,
        seen: Mutex<Vec<NaiveDate>>,
    }

    impl ScriptedTarget {
        fn new(script: impl IntoIterator<Item = usize>) -> Arc<Self> {
            Arc::new(Self {
                remaining: Mutex::new(script.into_iter().collect()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AvailabilityTarget for ScriptedTarget {
        async fn refresh_availability(&self, today: NaiveDate) -> usize {
            self.seen.lock().push(today);
            self.remaining.lock().pop_front().unwrap_or(1)
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_goes_idle_when_nothing_gated() {
        let clock = Arc::new(FixedClock::new(day(1)));
        let events = EventBus::new(8);
        let mut rx = events.subscribe();
        let monitor = AvailabilityMonitor::new(Duration::from_secs(60), clock.clone(), events);
        let target = ScriptedTarget::new([2, 0]);

        monitor.start(target.clone());
        assert!(monitor.is_running());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(target.seen.lock().len(), 1);

        clock.advance_days(1);
        tokio::time::sleep(Duration::from_secs(60)).await;
        tokio::task::yield_now().await;

        assert_eq!(*target.seen.lock(), vec![day(1), day(2)]);
        assert!(!monitor.is_running());
        assert_eq!(
            rx.try_recv().unwrap(),
            CoreEvent::Availability(AvailabilityEvent::MonitorIdle)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_future_ticks() {
        let clock = Arc::new(FixedClock::new(day(1)));
        let monitor = AvailabilityMonitor::new(Duration::from_secs(60), clock, EventBus::default());
        let target = ScriptedTarget::new([]);

        monitor.start(target.clone());
        tokio::time::sleep(Duration::from_secs(61)).await;
        monitor.stop();
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(target.seen.lock().len(), 1);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_loop() {
        let clock = Arc::new(FixedClock::new(day(1)));
        let monitor = AvailabilityMonitor::new(Duration::from_secs(60), clock, EventBus::default());
        let first = ScriptedTarget::new([]);
        let second = ScriptedTarget::new([]);

        monitor.start(first.clone());
        monitor.start(second.clone());
        tokio::time::sleep(Duration::from_secs(121)).await;

        assert!(first.seen.lock().is_empty());
        assert_eq!(second.seen.lock().len(), 2);
        monitor.stop();
    }
}
