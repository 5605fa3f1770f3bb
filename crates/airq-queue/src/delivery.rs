use crate::error::Result;
use async_trait::async_trait;

/// 单条消息的确认句柄
#[async_trait]
pub trait Acker: Send + Sync {
    async fn ack(self: Box<Self>) -> Result<()>;

    /// 拒绝消息；`requeue = false` 时进入死信队列（若已配置）
    async fn reject(self: Box<Self>, requeue: bool) -> Result<()>;
}

/// 一条投递
///
/// 自动确认模式下没有确认句柄，`ack`/`reject` 为空操作。
pub struct Delivery {
    pub payload: Vec<u8>,
    acker: Option<Box<dyn Acker>>,
}

impl Delivery {
    /// 已自动确认的投递
    pub fn auto(payload: Vec<u8>) -> Self {
        Self {
            payload,
            acker: None,
        }
    }

    pub fn manual(payload: Vec<u8>, acker: Box<dyn Acker>) -> Self {
        Self {
            payload,
            acker: Some(acker),
        }
    }

    pub fn needs_ack(&self) -> bool {
        self.acker.is_some()
    }

    pub async fn ack(self) -> Result<()> {
        match self.acker {
            Some(acker) => acker.ack().await,
            None => Ok(()),
        }
    }

    pub async fn reject(self, requeue: bool) -> Result<()> {
        match self.acker {
            Some(acker) => acker.reject(requeue).await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .field("needs_ack", &self.needs_ack())
            .finish()
    }
}
