use crate::error::BroadcastError;
use crate::metrics;
use crate::sink::SubscriberSink;
use airq_core::SharedRecordStore;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// 新订阅者快照的默认时间窗口（2 小时）
pub const DEFAULT_SNAPSHOT_WINDOW_SECS: i64 = 2 * 60 * 60;

struct Entry {
    generation: u64,
    sink: Box<dyn SubscriberSink>,
}

/// 注册结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub generation: u64,
    /// 是否替换了同 id 的旧连接（替换时不发送快照）
    pub replaced: bool,
    /// 快照中的告警条数
    pub snapshot_len: usize,
}

/// 一次广播的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: Vec<String>,
}

/// 订阅者注册表
///
/// 所有读写和遍历都在同一把锁内完成。新订阅者在锁内先收到最近告警快照再登记，
/// 因此快照与第一条实时推送之间不会漏掉告警。
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
    records: SharedRecordStore,
    snapshot_window: Duration,
}

impl SubscriberRegistry {
    pub fn new(records: SharedRecordStore) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            records,
            snapshot_window: Duration::seconds(DEFAULT_SNAPSHOT_WINDOW_SECS),
        }
    }

    pub fn with_snapshot_window(mut self, window: Duration) -> Self {
        self.snapshot_window = window;
        self
    }

    /// 登记订阅者
    ///
    /// 同 id 已存在时关闭旧连接并替换；否则先推送快照，推送失败则不登记。
    pub async fn register(
        &self,
        id: &str,
        mut sink: Box<dyn SubscriberSink>,
    ) -> Result<Registration, BroadcastError> {
        let mut subscribers = self.subscribers.lock().await;
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        if let Some(previous) = subscribers.get_mut(id) {
            let mut old = std::mem::replace(&mut previous.sink, sink);
            previous.generation = generation;
            old.close().await;

            info!(subscriber = %id, generation, "Subscriber reconnected, replaced old connection");
            return Ok(Registration {
                generation,
                replaced: true,
                snapshot_len: 0,
            });
        }

        let snapshot = match self.records.recent_alerts(self.snapshot_window).await {
            Ok(alerts) => alerts,
            Err(e) => {
                warn!(subscriber = %id, error = %e, "Failed to load alert snapshot");
                Vec::new()
            }
        };

        let payload = serde_json::to_vec(&snapshot)?;
        if let Err(e) = sink.send(&payload).await {
            sink.close().await;
            return Err(BroadcastError::SnapshotDelivery {
                id: id.to_string(),
                reason: e.to_string(),
            });
        }

        subscribers.insert(id.to_string(), Entry { generation, sink });
        metrics::set_subscribers(subscribers.len());
        info!(
            subscriber = %id,
            generation,
            snapshot = snapshot.len(),
            total = subscribers.len(),
            "Subscriber registered"
        );

        Ok(Registration {
            generation,
            replaced: false,
            snapshot_len: snapshot.len(),
        })
    }

    /// 移除订阅者；只有 generation 一致时才移除，避免旧连接误删新连接
    pub async fn remove(&self, id: &str, generation: u64) -> bool {
        let mut subscribers = self.subscribers.lock().await;

        match subscribers.get(id) {
            Some(entry) if entry.generation == generation => {}
            _ => return false,
        }

        if let Some(mut entry) = subscribers.remove(id) {
            entry.sink.close().await;
        }
        metrics::set_subscribers(subscribers.len());
        debug!(subscriber = %id, generation, "Subscriber removed");
        true
    }

    /// 推送给所有订阅者；写失败的订阅者在同一临界区内关闭并移除
    pub async fn broadcast(&self, payload: &[u8]) -> BroadcastReport {
        let mut subscribers = self.subscribers.lock().await;
        let mut report = BroadcastReport::default();

        for (id, entry) in subscribers.iter_mut() {
            match entry.sink.send(payload).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "Failed to push alert, dropping subscriber");
                    report.dropped.push(id.clone());
                }
            }
        }

        for id in &report.dropped {
            if let Some(mut entry) = subscribers.remove(id) {
                entry.sink.close().await;
            }
        }

        if !report.dropped.is_empty() {
            metrics::record_dropped(report.dropped.len());
            metrics::set_subscribers(subscribers.len());
        }
        report
    }

    /// 关闭并移除所有订阅者
    pub async fn close_all(&self) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        let closed = subscribers.len();
        for (_, mut entry) in subscribers.drain() {
            entry.sink.close().await;
        }
        metrics::set_subscribers(0);
        closed
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.subscribers.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use airq_core::{MemoryRecordStore, RecordStore};
    use airq_types::{AlertRecord, AnomalyReason, Measurement};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex as StdMutex};

    /// 记录收到的消息；`fail` 为 true 时每次写入都失败
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink {
        pub received: Arc<StdMutex<Vec<Vec<u8>>>>,
        pub attempts: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn messages(&self) -> Vec<Vec<u8>> {
            self.received.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubscriberSink for RecordingSink {
        async fn send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("broken pipe");
            }
            self.received.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        async fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn alert(parameter: &str, minutes_ago: i64) -> AlertRecord {
        AlertRecord::from_measurement(
            &Measurement::new(parameter, 99.0, 41.0, 29.0)
                .with_timestamp(chrono::Utc::now() - Duration::minutes(minutes_ago)),
            AnomalyReason::Threshold,
        )
    }

    #[tokio::test]
    async fn test_failing_subscriber_is_dropped() {
        let registry = SubscriberRegistry::new(Arc::new(MemoryRecordStore::new()));
        let good_a = RecordingSink::default();
        let good_b = RecordingSink::default();
        let bad = RecordingSink::failing();

        registry.register("a", Box::new(good_a.clone())).await.unwrap();
        registry.register("b", Box::new(good_b.clone())).await.unwrap();

        // 失败的订阅者连快照都收不到，先用能写的 sink 登记再换成失败的
        let flaky = RecordingSink::default();
        registry.register("c", Box::new(flaky)).await.unwrap();
        registry.register("c", Box::new(bad.clone())).await.unwrap();
        assert_eq!(registry.len().await, 3);

        let report = registry.broadcast(b"{\"parameter\":\"NO2\"}").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, vec!["c".to_string()]);
        assert_eq!(registry.len().await, 2);
        assert!(!registry.contains("c").await);
        assert_eq!(bad.closed.load(Ordering::SeqCst), 1);

        let report = registry.broadcast(b"{\"parameter\":\"SO2\"}").await;
        assert_eq!(report.delivered, 2);
        assert!(report.dropped.is_empty());
        assert_eq!(bad.attempts.load(Ordering::SeqCst), 1);

        // 快照 + 两条实时推送
        assert_eq!(good_a.messages().len(), 3);
        assert_eq!(good_b.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_sent_once_before_live_push() {
        let records = Arc::new(MemoryRecordStore::new());
        records.save_alert(&alert("PM10", 30)).await.unwrap();
        records.save_alert(&alert("NO2", 10)).await.unwrap();
        records.save_alert(&alert("SO2", 180)).await.unwrap();

        let registry = SubscriberRegistry::new(records);
        let sink = RecordingSink::default();

        let registration = registry.register("client-1", Box::new(sink.clone())).await.unwrap();
        assert!(!registration.replaced);
        assert_eq!(registration.snapshot_len, 2);

        registry.broadcast(b"{\"live\":true}").await;

        let messages = sink.messages();
        assert_eq!(messages.len(), 2);

        let snapshot: Vec<AlertRecord> = serde_json::from_slice(&messages[0]).unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].parameter, "PM10");
        assert_eq!(snapshot[1].parameter, "NO2");
        assert_eq!(messages[1], b"{\"live\":true}".to_vec());

        // 重连不再发快照，旧连接被关闭
        let reconnect = RecordingSink::default();
        let again = registry.register("client-1", Box::new(reconnect.clone())).await.unwrap();
        assert!(again.replaced);
        assert!(reconnect.messages().is_empty());
        assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_stale_generation_does_not_remove_replacement() {
        let registry = SubscriberRegistry::new(Arc::new(MemoryRecordStore::new()));

        let first = registry.register("x", Box::new(RecordingSink::default())).await.unwrap();
        let second = registry.register("x", Box::new(RecordingSink::default())).await.unwrap();
        assert_ne!(first.generation, second.generation);

        assert!(!registry.remove("x", first.generation).await);
        assert!(registry.contains("x").await);

        assert!(registry.remove("x", second.generation).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_failure_rejects_registration() {
        let registry = SubscriberRegistry::new(Arc::new(MemoryRecordStore::new()));
        let sink = RecordingSink::failing();

        let result = registry.register("y", Box::new(sink.clone())).await;
        assert!(matches!(result, Err(BroadcastError::SnapshotDelivery { .. })));
        assert!(registry.is_empty().await);
        assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = SubscriberRegistry::new(Arc::new(MemoryRecordStore::new()));
        let sink = RecordingSink::default();
        registry.register("a", Box::new(sink.clone())).await.unwrap();
        registry.register("b", Box::new(RecordingSink::default())).await.unwrap();

        assert_eq!(registry.close_all().await, 2);
        assert!(registry.is_empty().await);
        assert_eq!(sink.closed.load(Ordering::SeqCst), 1);
    }
}
