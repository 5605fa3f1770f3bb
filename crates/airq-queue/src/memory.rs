use crate::broker::{AckMode, Broker, QueueConsumer, QueueOptions, QueuePublisher};
use crate::dead_letter_queue;
use crate::delivery::{Acker, Delivery};
use crate::error::{QueueError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

type Receiver = Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>;

struct QueueSlot {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: Receiver,
}

impl QueueSlot {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx: Arc::new(Mutex::new(rx)),
        }
    }
}

/// 进程内消息代理（用于开发和测试）
///
/// 同一队列的多个消费者竞争消费，每条消息只投递给一个消费者。
#[derive(Clone, Default)]
pub struct MemoryBroker {
    queues: Arc<DashMap<String, QueueSlot>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn receiver(&self, queue: &str) -> Receiver {
        self.queues
            .entry(queue.to_string())
            .or_insert_with(QueueSlot::new)
            .rx
            .clone()
    }

    /// 投递一条消息到队列
    pub fn send(&self, queue: &str, payload: Vec<u8>) -> Result<()> {
        let tx = self
            .queues
            .entry(queue.to_string())
            .or_insert_with(QueueSlot::new)
            .tx
            .clone()
            .ok_or_else(|| QueueError::Closed(queue.to_string()))?;

        tx.send(payload)
            .map_err(|_| QueueError::Closed(queue.to_string()))
    }

    /// 关闭队列：不再接受新消息，消费者取完剩余消息后结束
    pub fn close_queue(&self, queue: &str) {
        if let Some(mut slot) = self.queues.get_mut(queue) {
            slot.tx = None;
            debug!(queue = %queue, "Memory queue closed");
        }
    }

    /// 取出队列中当前所有未消费的消息
    pub fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        let rx = self.receiver(queue);
        let mut drained = Vec::new();
        if let Ok(mut rx) = rx.try_lock() {
            while let Ok(payload) = rx.try_recv() {
                drained.push(payload);
            }
        }
        drained
    }
}

struct MemoryAcker {
    broker: MemoryBroker,
    queue: String,
    payload: Vec<u8>,
    dead_letter: bool,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn reject(self: Box<Self>, requeue: bool) -> Result<()> {
        if requeue {
            return self.broker.send(&self.queue, self.payload);
        }
        if self.dead_letter {
            return self
                .broker
                .send(&dead_letter_queue(&self.queue), self.payload);
        }
        debug!(queue = %self.queue, "Rejected message dropped");
        Ok(())
    }
}

struct MemoryConsumer {
    broker: MemoryBroker,
    queue: String,
    rx: Receiver,
    options: QueueOptions,
}

#[async_trait]
impl QueueConsumer for MemoryConsumer {
    async fn next(&mut self) -> Option<Result<Delivery>> {
        let payload = self.rx.lock().await.recv().await?;

        let delivery = match self.options.ack_mode {
            AckMode::Auto => Delivery::auto(payload),
            AckMode::Manual => Delivery::manual(
                payload.clone(),
                Box::new(MemoryAcker {
                    broker: self.broker.clone(),
                    queue: self.queue.clone(),
                    payload,
                    dead_letter: self.options.dead_letter(),
                }),
            ),
        };
        Some(Ok(delivery))
    }

    fn queue(&self) -> &str {
        &self.queue
    }
}

struct MemoryPublisher {
    broker: MemoryBroker,
    queue: String,
}

#[async_trait]
impl QueuePublisher for MemoryPublisher {
    async fn publish(&self, payload: &[u8]) -> Result<()> {
        self.broker
            .send(&self.queue, payload.to_vec())
            .map_err(|e| QueueError::Publish {
                queue: self.queue.clone(),
                reason: e.to_string(),
            })
    }

    fn queue(&self) -> &str {
        &self.queue
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn consumer(&self, queue: &str, options: &QueueOptions) -> Result<Box<dyn QueueConsumer>> {
        info!(queue = %queue, ack_mode = ?options.ack_mode, "Consuming memory queue");
        Ok(Box::new(MemoryConsumer {
            broker: self.clone(),
            queue: queue.to_string(),
            rx: self.receiver(queue),
            options: options.clone(),
        }))
    }

    async fn publisher(&self, queue: &str, _options: &QueueOptions) -> Result<Arc<dyn QueuePublisher>> {
        self.receiver(queue);
        Ok(Arc::new(MemoryPublisher {
            broker: self.clone(),
            queue: queue.to_string(),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }

    async fn close(&self) -> Result<()> {
        for mut slot in self.queues.iter_mut() {
            slot.tx = None;
        }
        Ok(())
    }
}
