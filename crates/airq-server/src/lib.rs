// 导出模块供 main.rs 和测试使用
pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod metrics;

use airq_broadcast::SubscriberHub;
use airq_core::SharedRecordStore;
use airq_queue::QueuePublisher;
use std::sync::Arc;

// 重新导出配置类型
pub use config::AppConfig;

// 定义 AppState（供 main.rs 和测试使用）
pub struct AppState {
    pub records: SharedRecordStore,
    /// 读数队列发布者，`POST /api/ingest` 使用
    pub ingest: Arc<dyn QueuePublisher>,
    pub hub: SubscriberHub,
}
