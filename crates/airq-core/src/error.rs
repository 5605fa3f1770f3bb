use thiserror::Error;

/// Airq 核心统一错误类型
#[derive(Error, Debug)]
pub enum AirqError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, AirqError>;
