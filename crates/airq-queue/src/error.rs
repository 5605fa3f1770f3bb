use thiserror::Error;

/// 队列错误
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Publish to '{queue}' failed: {reason}")]
    Publish { queue: String, reason: String },

    #[error("Acknowledge failed: {0}")]
    Ack(String),

    #[error("Queue '{0}' is closed")]
    Closed(String),
}

#[cfg(feature = "amqp")]
impl From<lapin::Error> for QueueError {
    fn from(err: lapin::Error) -> Self {
        QueueError::Channel(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
