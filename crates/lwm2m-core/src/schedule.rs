//! Scheduling and clock abstractions.
//!
//! The engine never spawns timers itself. Periodic self-notification is
//! driven through a `Scheduler` supplied by the runtime (tokio on Linux),
//! and computed time resources read a `Clock`. Both are traits so the core
//! stays runtime-agnostic and tests can drive time by hand.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Callback run on every tick of a recurring schedule.
pub type RecurringTask = Box<dyn FnMut() + Send + 'static>;

/// A runtime's recurring timer primitive.
pub trait Scheduler: Send + Sync {
    /// Run `task` after `delay`, then every `period`.
    fn schedule_recurring(
        &self,
        delay: Duration,
        period: Duration,
        task: RecurringTask,
    ) -> Box<dyn ScheduledTask>;
}

/// Handle to a running recurring schedule.
pub trait ScheduledTask: Send {
    /// Stop the schedule.
    ///
    /// Must return promptly; an in-flight callback is not waited for.
    fn cancel(&mut self);

    fn is_cancelled(&self) -> bool;
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A scheduler whose ticks are driven by the caller.
///
/// Useful for hosts that run their own event loop, and for tests. Delay and
/// period are recorded but not enforced; every `tick` runs each live task
/// once.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    tasks: Arc<Mutex<Vec<ManualEntry>>>,
}

struct ManualEntry {
    delay: Duration,
    period: Duration,
    cancelled: Arc<AtomicBool>,
    task: RecurringTask,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every task that has not been cancelled.
    pub fn tick(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|entry| !entry.cancelled.load(Ordering::Acquire));
        for entry in tasks.iter_mut() {
            (entry.task)();
        }
    }

    /// (delay, period) of every live task, in scheduling order.
    pub fn schedules(&self) -> Vec<(Duration, Duration)> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| !entry.cancelled.load(Ordering::Acquire))
            .map(|entry| (entry.delay, entry.period))
            .collect()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_recurring(
        &self,
        delay: Duration,
        period: Duration,
        task: RecurringTask,
    ) -> Box<dyn ScheduledTask> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ManualEntry {
                delay,
                period,
                cancelled: cancelled.clone(),
                task,
            });
        Box::new(ManualTask { cancelled })
    }
}

struct ManualTask {
    cancelled: Arc<AtomicBool>,
}

impl ScheduledTask for ManualTask {
    fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_scheduler_ticks_until_cancelled() {
        let scheduler = ManualScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let mut task = scheduler.schedule_recurring(
            Duration::from_millis(100),
            Duration::from_millis(1000),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(
            scheduler.schedules(),
            vec![(Duration::from_millis(100), Duration::from_millis(1000))]
        );

        scheduler.tick();
        scheduler.tick();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        task.cancel();
        assert!(task.is_cancelled());
        scheduler.tick();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(scheduler.schedules().is_empty());
    }

    #[test]
    fn test_fixed_clock() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 17, 10, 30, 0).unwrap();
        assert_eq!(FixedClock(instant).now(), instant);
    }
}
