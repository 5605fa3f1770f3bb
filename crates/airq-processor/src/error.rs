use airq_queue::QueueError;
use thiserror::Error;

/// 处理流水线错误
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
