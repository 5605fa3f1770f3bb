use crate::error::Result;
use crate::geo::BoundingBox;
use airq_types::{AlertRecord, Measurement, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// 持久化存储（system of record）trait
///
/// 读数和告警的最终落地位置，同时为窗口缓存提供回源查询。
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 保存原始读数
    async fn save_measurement(&self, measurement: &Measurement) -> Result<()>;

    /// 保存告警
    async fn save_alert(&self, alert: &AlertRecord) -> Result<()>;

    /// 最近 `window` 时间内的告警，按时间升序
    async fn recent_alerts(&self, window: Duration) -> Result<Vec<AlertRecord>>;

    /// `[start, end]` 内的告警，按时间降序
    async fn alerts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>>;

    /// 落在矩形范围内的告警，按时间降序
    async fn alerts_in_box(&self, bbox: &BoundingBox) -> Result<Vec<AlertRecord>>;

    /// `timestamp >= cutoff` 的读数之和与条数
    async fn sum_and_count(&self, parameter: &str, cutoff: DateTime<Utc>) -> Result<(f64, i64)>;

    /// `timestamp >= cutoff` 的读数，按时间升序
    async fn samples_since(&self, parameter: &str, cutoff: DateTime<Utc>) -> Result<Vec<Sample>>;
}

pub type SharedRecordStore = Arc<dyn RecordStore>;
