use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// A deferred unit of work. Shared so repeating schedules can run it on
/// every tick.
pub type ScheduledTask =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Handle for a scheduled task. Dropping the token does not cancel the
/// task; cancellation is always explicit.
pub struct CancelToken {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl CancelToken {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Timer facility the poller schedules against, kept to the two operations
/// it needs so hosts can substitute their own timer plumbing.
pub trait Scheduler: Send + Sync {
    /// Run `task` once, `delay` from now.
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) -> CancelToken;

    /// Run `task` every `period`, first firing one full period from now.
    fn schedule_repeating(&self, period: Duration, task: ScheduledTask) -> CancelToken;
}

/// Scheduler backed by the tokio runtime's timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: ScheduledTask) -> CancelToken {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task().await;
        });

        CancelToken::new(move || handle.abort())
    }

    fn schedule_repeating(&self, period: Duration, task: ScheduledTask) -> CancelToken {
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                task().await;
            }
        });

        CancelToken::new(move || handle.abort())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_task(counter: &Arc<AtomicUsize>) -> ScheduledTask {
        let counter = Arc::clone(counter);
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    async fn advance(duration: Duration) {
        settle().await;
        tokio::time::advance(duration).await;
        settle().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_once_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let _token = TokioScheduler.schedule_once(Duration::from_secs(5), counting_task(&fired));

        advance(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        advance(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        advance(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_once_cancel_prevents_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let token = TokioScheduler.schedule_once(Duration::from_secs(5), counting_task(&fired));

        advance(Duration::from_secs(4)).await;
        token.cancel();

        advance(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_repeating_fires_every_period() {
        let fired = Arc::new(AtomicUsize::new(0));
        let _token =
            TokioScheduler.schedule_repeating(Duration::from_secs(10), counting_task(&fired));

        advance(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        advance(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        advance(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        advance(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_repeating_cancel_stops_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let token =
            TokioScheduler.schedule_repeating(Duration::from_secs(10), counting_task(&fired));

        advance(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        token.cancel();

        advance(Duration::from_secs(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
