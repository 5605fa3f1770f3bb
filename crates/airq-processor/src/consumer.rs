use crate::error::Result;
use crate::metrics;
use crate::publisher::AlertPublisher;
use airq_anomaly::Evaluator;
use airq_core::SharedRecordStore;
use airq_queue::{Broker, Delivery, QueueConsumer, QueueOptions};
use airq_shutdown::ShutdownSignal;
use airq_types::{AnomalyReason, Measurement};
use airq_window::WindowStore;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// 消费者状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Connected,
    Consuming,
    Processing,
    ShuttingDown,
    Stopped,
}

/// 单条消息的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 无异常
    Normal,
    /// 检测到异常并已发布告警
    Alerted(AnomalyReason),
    /// 检测到异常但告警发布失败
    PublishFailed(AnomalyReason),
    /// 消息体无法解码或校验失败
    Malformed,
}

/// 消费统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub malformed: u64,
    pub alerted: u64,
    pub publish_failures: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: Outcome) {
        self.received += 1;
        match outcome {
            Outcome::Normal => {}
            Outcome::Alerted(_) => self.alerted += 1,
            Outcome::PublishFailed(_) => self.publish_failures += 1,
            Outcome::Malformed => self.malformed += 1,
        }
    }
}

/// 读数队列消费者
///
/// 每条消息：解码 → 更新窗口 → 持久化原始读数 → 基于更新后的窗口评估 → 异常时发布告警。
/// 解码失败和持久化失败只记录日志，不会中断消费。
pub struct MeasurementConsumer {
    window: WindowStore,
    records: SharedRecordStore,
    evaluator: Arc<Evaluator>,
    publisher: AlertPublisher,
    state_tx: watch::Sender<ConsumerState>,
}

impl MeasurementConsumer {
    pub fn new(
        window: WindowStore,
        records: SharedRecordStore,
        evaluator: Arc<Evaluator>,
        publisher: AlertPublisher,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConsumerState::Idle);
        Self {
            window,
            records,
            evaluator,
            publisher,
            state_tx,
        }
    }

    pub fn state(&self) -> ConsumerState {
        *self.state_tx.borrow()
    }

    /// 订阅状态变化
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Consumer state changed");
        }
    }

    /// 连接队列并消费，直到收到关闭信号或队列关闭
    ///
    /// 队列声明失败属于启动错误，直接返回。
    pub async fn start(
        &self,
        broker: &dyn Broker,
        queue: &str,
        options: &QueueOptions,
        shutdown: broadcast::Receiver<ShutdownSignal>,
    ) -> Result<ConsumerStats> {
        let consumer = broker.consumer(queue, options).await?;
        Ok(self.run(consumer, shutdown).await)
    }

    /// 在已连接的消费者上运行消费循环
    pub async fn run(
        &self,
        mut consumer: Box<dyn QueueConsumer>,
        mut shutdown: broadcast::Receiver<ShutdownSignal>,
    ) -> ConsumerStats {
        self.set_state(ConsumerState::Connected);
        info!(queue = %consumer.queue(), "Measurement consumer started");

        let mut stats = ConsumerStats::default();
        loop {
            self.set_state(ConsumerState::Consuming);

            let next = tokio::select! {
                signal = shutdown.recv() => {
                    info!(?signal, "Measurement consumer received shutdown signal");
                    break;
                }
                next = consumer.next() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(error = %e, "Failed to receive measurement");
                    continue;
                }
                None => {
                    info!(queue = %consumer.queue(), "Measurement queue closed");
                    break;
                }
            };

            self.set_state(ConsumerState::Processing);
            stats.record(self.handle(delivery).await);
        }

        self.set_state(ConsumerState::ShuttingDown);
        info!(
            received = stats.received,
            malformed = stats.malformed,
            alerted = stats.alerted,
            publish_failures = stats.publish_failures,
            "Measurement consumer stopping"
        );
        self.set_state(ConsumerState::Stopped);
        stats
    }

    /// 处理一条投递；手动确认模式下，处理完成后确认，无法解码的消息拒绝且不重新入队
    pub async fn handle(&self, delivery: Delivery) -> Outcome {
        let outcome = self.process(&delivery.payload).await;

        if delivery.needs_ack() {
            let result = match outcome {
                Outcome::Malformed => delivery.reject(false).await,
                _ => delivery.ack().await,
            };
            if let Err(e) = result {
                warn!(error = %e, "Failed to acknowledge measurement");
            }
        }
        outcome
    }

    /// 处理一条消息体
    pub async fn process(&self, payload: &[u8]) -> Outcome {
        metrics::record_received();

        let measurement = match decode(payload) {
            Some(m) => m,
            None => {
                metrics::record_malformed();
                return Outcome::Malformed;
            }
        };

        self.window
            .update(&measurement.parameter, measurement.value, measurement.timestamp)
            .await;

        if let Err(e) = self.records.save_measurement(&measurement).await {
            metrics::record_persistence_failure("measurement");
            error!(
                parameter = %measurement.parameter,
                error = %e,
                "Failed to persist measurement"
            );
        }

        let aggregate = self.window.aggregate_for(&measurement).await;
        let verdict = self.evaluator.evaluate(&measurement, &aggregate);
        if !verdict.is_anomalous {
            return Outcome::Normal;
        }

        metrics::record_anomaly(verdict.reason);
        info!(
            parameter = %measurement.parameter,
            value = measurement.value,
            reason = %verdict.reason,
            window_count = aggregate.count,
            "Anomaly detected"
        );

        match self.publisher.publish(&verdict.measurement, verdict.reason).await {
            Ok(_) => Outcome::Alerted(verdict.reason),
            Err(e) => {
                error!(
                    parameter = %measurement.parameter,
                    error = %e,
                    "Failed to publish alert"
                );
                Outcome::PublishFailed(verdict.reason)
            }
        }
    }
}

fn decode(payload: &[u8]) -> Option<Measurement> {
    let measurement = match Measurement::from_slice(payload) {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, bytes = payload.len(), "Skipping malformed measurement");
            return None;
        }
    };

    if let Err(e) = measurement.validate() {
        warn!(error = %e, "Skipping invalid measurement");
        return None;
    }
    Some(measurement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use airq_core::MemoryRecordStore;
    use airq_queue::{MemoryBroker, ALERT_QUEUE};
    use airq_shutdown::SignalHandler;

    async fn consumer_with(broker: &MemoryBroker, records: Arc<MemoryRecordStore>) -> MeasurementConsumer {
        let publisher = broker
            .publisher(ALERT_QUEUE, &QueueOptions::default())
            .await
            .unwrap();
        MeasurementConsumer::new(
            WindowStore::in_memory(),
            records,
            Arc::new(Evaluator::standard()),
            AlertPublisher::new(publisher),
        )
    }

    #[tokio::test]
    async fn test_process_normal_reading() {
        let broker = MemoryBroker::new();
        let records = Arc::new(MemoryRecordStore::new());
        let consumer = consumer_with(&broker, records.clone()).await;

        let payload = Measurement::new("PM10", 12.0, 41.0, 29.0).to_vec().unwrap();
        assert_eq!(consumer.process(&payload).await, Outcome::Normal);
        assert_eq!(records.measurement_count().await, 1);
        assert!(broker.drain(ALERT_QUEUE).is_empty());
    }

    #[tokio::test]
    async fn test_process_threshold_publishes_alert() {
        let broker = MemoryBroker::new();
        let consumer = consumer_with(&broker, Arc::new(MemoryRecordStore::new())).await;

        let payload = Measurement::new("PM2.5", 20.0, 41.0, 29.0).to_vec().unwrap();
        assert_eq!(
            consumer.process(&payload).await,
            Outcome::Alerted(AnomalyReason::Threshold)
        );

        let alerts = broker.drain(ALERT_QUEUE);
        assert_eq!(alerts.len(), 1);
        assert!(String::from_utf8_lossy(&alerts[0]).contains("\"description\":\"Threshold\""));
    }

    #[tokio::test]
    async fn test_invalid_coordinates_are_malformed() {
        let broker = MemoryBroker::new();
        let records = Arc::new(MemoryRecordStore::new());
        let consumer = consumer_with(&broker, records.clone()).await;

        let payload = br#"{"latitude":120.0,"longitude":0.0,"parameter":"NO2","value":1.0}"#;
        assert_eq!(consumer.process(payload).await, Outcome::Malformed);
        assert_eq!(records.measurement_count().await, 0);
    }

    #[tokio::test]
    async fn test_state_transitions_to_stopped_on_shutdown() {
        let broker = MemoryBroker::new();
        let consumer = Arc::new(consumer_with(&broker, Arc::new(MemoryRecordStore::new())).await);
        let mut states = consumer.subscribe_state();
        assert_eq!(consumer.state(), ConsumerState::Idle);

        let (handler, rx) = SignalHandler::new();
        let queue = broker.consumer("measurements", &QueueOptions::default()).await.unwrap();

        let running = consumer.clone();
        let task = tokio::spawn(async move { running.run(queue, rx).await });

        states
            .wait_for(|s| *s == ConsumerState::Consuming)
            .await
            .unwrap();

        handler.trigger(ShutdownSignal::Manual);
        let stats = task.await.unwrap();

        assert_eq!(stats, ConsumerStats::default());
        assert_eq!(consumer.state(), ConsumerState::Stopped);
    }
}
