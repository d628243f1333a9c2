//! Periodic background refresh task.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest interval the loop will run at. Shorter requests are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to a running refresh loop.
///
/// The loop calls `tick` once per interval, starting one interval after
/// spawn. It ends when [`stop`](Self::stop) is called, when the handle is
/// dropped, or when `tick` returns `false`.
#[derive(Debug)]
pub struct AutoReload {
    token: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl AutoReload {
    pub fn spawn<F, Fut>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let interval = if interval < MIN_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                min_ms = MIN_INTERVAL.as_millis() as u64,
                "Auto-reload interval too short, using minimum"
            );
            MIN_INTERVAL
        } else {
            interval
        };

        let token = CancellationToken::new();
        let cancelled = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => {
                        debug!("Auto-reload cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if !tick().await {
                            debug!("Auto-reload target gone, stopping");
                            break;
                        }
                    }
                }
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "Auto-reload started");
        Self { token, handle, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Stop the loop. Safe to call more than once.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            self.token.cancel();
            info!("Auto-reload stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for AutoReload {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting(interval: Duration) -> (AutoReload, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        let counter = count.clone();
        let reload = AutoReload::spawn(interval, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            }
        });
        (reload, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_interval_after_the_first() {
        let (reload, count) = counting(Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(reload.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let (reload, count) = counting(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        reload.stop();
        reload.stop();
        assert!(!reload.is_running());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_raised_to_minimum() {
        let (reload, count) = counting(Duration::ZERO);
        assert_eq!(reload.interval(), MIN_INTERVAL);

        tokio::time::sleep(MIN_INTERVAL * 3 + Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(reload.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let (reload, count) = counting(Duration::from_secs(1));
        drop(reload);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_returning_false_ends_loop() {
        let reload = AutoReload::spawn(Duration::from_secs(1), || async { false });
        tokio::time::sleep(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert!(!reload.is_running());
    }
}
