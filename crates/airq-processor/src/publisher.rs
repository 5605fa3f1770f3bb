use crate::error::Result;
use crate::metrics;
use airq_queue::QueuePublisher;
use airq_types::{AlertRecord, AnomalyReason, Measurement};
use std::sync::Arc;
use tracing::{debug, warn};

/// 告警发布者
///
/// 把异常读数封装成 `AlertRecord` 写入告警队列，检测与推送由此解耦。
#[derive(Clone)]
pub struct AlertPublisher {
    publisher: Arc<dyn QueuePublisher>,
}

impl AlertPublisher {
    pub fn new(publisher: Arc<dyn QueuePublisher>) -> Self {
        Self { publisher }
    }

    pub fn queue(&self) -> &str {
        self.publisher.queue()
    }

    /// 发布告警，失败返回给调用方
    pub async fn publish(&self, measurement: &Measurement, reason: AnomalyReason) -> Result<AlertRecord> {
        let alert = AlertRecord::from_measurement(measurement, reason);
        let payload = alert.to_vec()?;

        if let Err(e) = self.publisher.publish(&payload).await {
            metrics::record_publish_failure();
            warn!(queue = %self.publisher.queue(), error = %e, "Alert publish failed");
            return Err(e.into());
        }

        metrics::record_alert_published();
        debug!(
            parameter = %alert.parameter,
            value = alert.value,
            reason = %reason,
            "Alert published"
        );
        Ok(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airq_queue::{Broker, MemoryBroker, QueueOptions, ALERT_QUEUE};

    #[tokio::test]
    async fn test_publish_writes_alert_json() {
        let broker = MemoryBroker::new();
        let publisher = AlertPublisher::new(
            broker.publisher(ALERT_QUEUE, &QueueOptions::default()).await.unwrap(),
        );

        let m = Measurement::new("PM2.5", 20.0, 41.0, 29.0);
        let alert = publisher.publish(&m, AnomalyReason::Threshold).await.unwrap();
        assert_eq!(alert.description, "Threshold");

        let queued = broker.drain(ALERT_QUEUE);
        assert_eq!(queued.len(), 1);

        let decoded = AlertRecord::from_slice(&queued[0]).unwrap();
        assert_eq!(decoded, alert);
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned() {
        let broker = MemoryBroker::new();
        let publisher = AlertPublisher::new(
            broker.publisher(ALERT_QUEUE, &QueueOptions::default()).await.unwrap(),
        );
        broker.close_queue(ALERT_QUEUE);

        let m = Measurement::new("NO2", 90.0, 0.0, 0.0);
        assert!(publisher.publish(&m, AnomalyReason::Threshold).await.is_err());
    }
}
