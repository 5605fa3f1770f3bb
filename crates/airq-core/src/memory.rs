use crate::error::Result;
use crate::geo::BoundingBox;
use crate::record::RecordStore;
use airq_types::{AlertRecord, Measurement, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// 内存存储（用于开发和测试）
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    measurements: Arc<RwLock<Vec<Measurement>>>,
    alerts: Arc<RwLock<Vec<AlertRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn measurement_count(&self) -> usize {
        self.measurements.read().await.len()
    }

    pub async fn alerts(&self) -> Vec<AlertRecord> {
        self.alerts.read().await.clone()
    }
}

fn newest_first(mut alerts: Vec<AlertRecord>) -> Vec<AlertRecord> {
    alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    alerts
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save_measurement(&self, measurement: &Measurement) -> Result<()> {
        self.measurements.write().await.push(measurement.clone());
        Ok(())
    }

    async fn save_alert(&self, alert: &AlertRecord) -> Result<()> {
        self.alerts.write().await.push(alert.clone());
        Ok(())
    }

    async fn recent_alerts(&self, window: Duration) -> Result<Vec<AlertRecord>> {
        let since = Utc::now() - window;
        let mut recent: Vec<AlertRecord> = self
            .alerts
            .read()
            .await
            .iter()
            .filter(|a| a.timestamp >= since)
            .cloned()
            .collect();
        recent.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(recent)
    }

    async fn alerts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>> {
        let alerts = self.alerts.read().await;
        Ok(newest_first(
            alerts
                .iter()
                .filter(|a| a.timestamp >= start && a.timestamp <= end)
                .cloned()
                .collect(),
        ))
    }

    async fn alerts_in_box(&self, bbox: &BoundingBox) -> Result<Vec<AlertRecord>> {
        let alerts = self.alerts.read().await;
        Ok(newest_first(
            alerts
                .iter()
                .filter(|a| bbox.contains(a.latitude, a.longitude))
                .cloned()
                .collect(),
        ))
    }

    async fn sum_and_count(&self, parameter: &str, cutoff: DateTime<Utc>) -> Result<(f64, i64)> {
        let measurements = self.measurements.read().await;
        let (sum, count) = measurements
            .iter()
            .filter(|m| m.parameter == parameter && m.timestamp >= cutoff)
            .fold((0.0, 0i64), |(sum, count), m| (sum + m.value, count + 1));
        Ok((sum, count))
    }

    async fn samples_since(&self, parameter: &str, cutoff: DateTime<Utc>) -> Result<Vec<Sample>> {
        let measurements = self.measurements.read().await;
        let mut samples: Vec<Sample> = measurements
            .iter()
            .filter(|m| m.parameter == parameter && m.timestamp >= cutoff)
            .map(|m| Sample::new(m.timestamp, m.value))
            .collect();
        samples.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(samples)
    }
}
