//! Tokio implementation of the engine's recurring timer.

use std::time::Duration;

use lwm2m_core::schedule::RecurringTask;
use lwm2m_core::{ScheduledTask, Scheduler};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// Longest delay or period honored; longer ones mean "practically never".
const MAX_SPAN: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Runs recurring tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Scheduler on the runtime of the calling task.
    ///
    /// Panics outside a tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_recurring(
        &self,
        delay: Duration,
        period: Duration,
        mut task: RecurringTask,
    ) -> Box<dyn ScheduledTask> {
        // tokio intervals reject a zero period and panic on instant overflow
        let period = period.clamp(Duration::from_millis(1), MAX_SPAN);
        let now = Instant::now();
        let start = now
            .checked_add(delay)
            .filter(|_| delay <= MAX_SPAN)
            .unwrap_or(now + MAX_SPAN);

        let handle = self.handle.spawn(async move {
            let mut interval = interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                trace!("recurring task tick");
                task();
            }
        });

        Box::new(TokioTask {
            handle,
            cancelled: false,
        })
    }
}

struct TokioTask {
    handle: JoinHandle<()>,
    cancelled: bool,
}

impl ScheduledTask for TokioTask {
    fn cancel(&mut self) {
        self.handle.abort();
        self.cancelled = true;
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled || self.handle.is_finished()
    }
}
