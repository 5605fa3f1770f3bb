use thiserror::Error;

/// 订阅与推送错误
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to deliver snapshot to '{id}': {reason}")]
    SnapshotDelivery { id: String, reason: String },

    #[error("Server is shutting down")]
    ShuttingDown,
}
