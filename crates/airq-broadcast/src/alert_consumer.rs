use crate::metrics;
use crate::registry::SubscriberRegistry;
use airq_core::SharedRecordStore;
use airq_queue::QueueConsumer;
use airq_shutdown::ShutdownSignal;
use airq_types::AlertRecord;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// 告警消费统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertConsumerStats {
    pub received: u64,
    pub malformed: u64,
    pub persistence_failures: u64,
    pub deliveries: u64,
}

/// 告警队列消费者：持久化后推送给所有订阅者
pub struct AlertConsumer {
    records: SharedRecordStore,
    registry: Arc<SubscriberRegistry>,
}

impl AlertConsumer {
    pub fn new(records: SharedRecordStore, registry: Arc<SubscriberRegistry>) -> Self {
        Self { records, registry }
    }

    pub async fn run(
        &self,
        mut consumer: Box<dyn QueueConsumer>,
        mut shutdown: broadcast::Receiver<ShutdownSignal>,
    ) -> AlertConsumerStats {
        info!(queue = %consumer.queue(), "Alert consumer started");
        let mut stats = AlertConsumerStats::default();

        loop {
            let next = tokio::select! {
                signal = shutdown.recv() => {
                    info!(?signal, "Alert consumer received shutdown signal");
                    break;
                }
                next = consumer.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(error = %e, "Failed to receive alert");
                    continue;
                }
                None => {
                    info!(queue = %consumer.queue(), "Alert queue closed");
                    break;
                }
            };

            self.handle(&delivery.payload, &mut stats).await;
            if let Err(e) = delivery.ack().await {
                warn!(error = %e, "Failed to acknowledge alert");
            }
        }

        info!(
            received = stats.received,
            malformed = stats.malformed,
            deliveries = stats.deliveries,
            "Alert consumer stopped"
        );
        stats
    }

    /// 处理一条告警消息：无法解码的直接跳过；持久化失败仍然推送
    pub async fn handle(&self, payload: &[u8], stats: &mut AlertConsumerStats) {
        stats.received += 1;

        let alert = match AlertRecord::from_slice(payload) {
            Ok(alert) => alert,
            Err(e) => {
                stats.malformed += 1;
                warn!(error = %e, bytes = payload.len(), "Skipping malformed alert");
                return;
            }
        };

        if let Err(e) = self.records.save_alert(&alert).await {
            stats.persistence_failures += 1;
            metrics::record_persistence_failure();
            error!(parameter = %alert.parameter, error = %e, "Failed to persist alert");
        }

        let report = self.registry.broadcast(payload).await;
        stats.deliveries += report.delivered as u64;
        metrics::record_broadcast();
        debug!(
            parameter = %alert.parameter,
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Alert broadcast"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::RecordingSink;
    use airq_core::MemoryRecordStore;
    use airq_queue::{Broker, MemoryBroker, QueueOptions, ALERT_QUEUE};
    use airq_shutdown::SignalHandler;
    use airq_types::{AnomalyReason, Measurement};

    #[tokio::test]
    async fn test_alerts_are_persisted_and_broadcast() {
        let records = Arc::new(MemoryRecordStore::new());
        let registry = Arc::new(SubscriberRegistry::new(records.clone()));
        let sink = RecordingSink::default();
        registry.register("s1", Box::new(sink.clone())).await.unwrap();

        let broker = MemoryBroker::new();
        let queue = broker.consumer(ALERT_QUEUE, &QueueOptions::default()).await.unwrap();

        let alert = AlertRecord::from_measurement(
            &Measurement::new("PM2.5", 20.0, 41.0, 29.0),
            AnomalyReason::Threshold,
        );
        let payload = alert.to_vec().unwrap();
        broker.send(ALERT_QUEUE, b"not an alert".to_vec()).unwrap();
        broker.send(ALERT_QUEUE, payload.clone()).unwrap();
        broker.close_queue(ALERT_QUEUE);

        let (_handler, shutdown) = SignalHandler::new();
        let stats = AlertConsumer::new(records.clone(), registry)
            .run(queue, shutdown)
            .await;

        assert_eq!(stats.received, 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.deliveries, 1);

        assert_eq!(records.alerts().await, vec![alert]);

        // 快照 + 原始告警字节
        let messages = sink.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], payload);
    }
}
