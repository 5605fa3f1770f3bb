use crate::delivery::Delivery;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 确认模式
///
/// `Auto` 投递即确认（至多一次），`Manual` 由消费者处理完成后显式确认。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckMode {
    #[default]
    Auto,
    Manual,
}

/// 队列声明与消费参数
#[derive(Debug, Clone, PartialEq)]
pub struct QueueOptions {
    pub durable: bool,
    pub ack_mode: AckMode,
    pub prefetch: u16,
}

impl QueueOptions {
    pub fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// 手动确认时拒绝的消息进入死信队列
    pub fn dead_letter(&self) -> bool {
        self.ack_mode == AckMode::Manual
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            durable: true,
            ack_mode: AckMode::Auto,
            prefetch: 32,
        }
    }
}

/// 队列消费者
#[async_trait]
pub trait QueueConsumer: Send {
    /// 下一条消息；`None` 表示队列已关闭
    async fn next(&mut self) -> Option<Result<Delivery>>;

    fn queue(&self) -> &str;
}

/// 队列发布者
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, payload: &[u8]) -> Result<()>;

    fn queue(&self) -> &str;
}

/// 消息代理
#[async_trait]
pub trait Broker: Send + Sync {
    /// 声明队列并开始消费
    async fn consumer(&self, queue: &str, options: &QueueOptions) -> Result<Box<dyn QueueConsumer>>;

    /// 声明队列并返回发布者
    async fn publisher(&self, queue: &str, options: &QueueOptions) -> Result<Arc<dyn QueuePublisher>>;

    fn name(&self) -> &str;

    async fn close(&self) -> Result<()>;
}

pub type SharedBroker = Arc<dyn Broker>;
