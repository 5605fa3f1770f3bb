use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

struct TrackerInner {
    active: AtomicUsize,
    shutting_down: AtomicBool,
    released: Notify,
}

/// 订阅连接跟踪器
///
/// 每个 WebSocket 订阅者持有一个 `ConnectionGuard`，关闭时等待所有守卫释放。
#[derive(Clone)]
pub struct ConnectionTracker {
    inner: Arc<TrackerInner>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                active: AtomicUsize::new(0),
                shutting_down: AtomicBool::new(false),
                released: Notify::new(),
            }),
        }
    }

    /// 登记一个连接；关闭开始后返回 `None`
    pub fn acquire(&self) -> Option<ConnectionGuard> {
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            debug!("Rejecting new connection: shutting down");
            return None;
        }

        let count = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(active = count, "Connection acquired");
        Some(ConnectionGuard {
            inner: self.inner.clone(),
        })
    }

    pub fn start_shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
    }

    /// 拒绝新连接并等待现有连接释放，返回超时后仍未释放的连接数
    pub async fn drain(&self, max_wait: Duration) -> usize {
        self.start_shutdown();
        info!(active = self.active_count(), "Draining subscriber connections");

        let wait_all = async {
            loop {
                let released = self.inner.released.notified();
                if self.active_count() == 0 {
                    break;
                }
                released.await;
            }
        };

        if tokio::time::timeout(max_wait, wait_all).await.is_err() {
            let remaining = self.active_count();
            warn!(remaining, ?max_wait, "Connection drain timed out");
            return remaining;
        }

        info!("All subscriber connections drained");
        0
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// 连接守卫，drop 时释放
pub struct ConnectionGuard {
    inner: Arc<TrackerInner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let prev = self.inner.active.fetch_sub(1, Ordering::SeqCst);
        debug!(active = prev.saturating_sub(1), "Connection released");
        self.inner.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guards_track_active_count() {
        let tracker = ConnectionTracker::new();

        let first = tracker.acquire().unwrap();
        let second = tracker.acquire().unwrap();
        assert_eq!(tracker.active_count(), 2);

        drop(first);
        assert_eq!(tracker.active_count(), 1);
        drop(second);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_connections() {
        let tracker = ConnectionTracker::new();
        let _guard = tracker.acquire().unwrap();

        tracker.start_shutdown();
        assert!(tracker.is_shutting_down());
        assert!(tracker.acquire().is_none());
    }

    #[tokio::test]
    async fn test_drain_waits_for_release() {
        let tracker = ConnectionTracker::new();
        let first = tracker.acquire().unwrap();
        let second = tracker.acquire().unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(first);
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(second);
        });

        assert_eq!(tracker.drain(Duration::from_secs(2)).await, 0);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_timeout_reports_remaining() {
        let tracker = ConnectionTracker::new();
        let _guard = tracker.acquire().unwrap();

        assert_eq!(tracker.drain(Duration::from_millis(100)).await, 1);
    }

    #[tokio::test]
    async fn test_drain_pending_until_last_guard_dropped() {
        use tokio_test::{assert_pending, assert_ready_eq, task};

        let tracker = ConnectionTracker::new();
        let guard = tracker.acquire().unwrap();

        let mut drain = task::spawn(tracker.drain(Duration::from_secs(5)));
        assert_pending!(drain.poll());
        assert!(tracker.is_shutting_down());

        drop(guard);
        assert!(drain.is_woken());
        assert_ready_eq!(drain.poll(), 0);
    }
}
