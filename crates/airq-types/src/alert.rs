use crate::measurement::Measurement;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 异常原因
///
/// 下游按该字符串做展示，取值固定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyReason {
    Threshold,
    PercentageIncrease,
    ZScore,
    TimeSeries,
    Geospatial,
    None,
}

impl AnomalyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyReason::Threshold => "Threshold",
            AnomalyReason::PercentageIncrease => "PercentageIncrease",
            AnomalyReason::ZScore => "ZScore",
            AnomalyReason::TimeSeries => "TimeSeries",
            AnomalyReason::Geospatial => "Geospatial",
            AnomalyReason::None => "None",
        }
    }
}

impl fmt::Display for AnomalyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 告警记录
///
/// 告警队列消息格式：`{parameter, value, latitude, longitude, timestamp, description}`，
/// `description` 即异常原因。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub parameter: String,
    pub value: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl AlertRecord {
    pub fn from_measurement(measurement: &Measurement, reason: AnomalyReason) -> Self {
        Self {
            parameter: measurement.parameter.clone(),
            value: measurement.value,
            latitude: measurement.latitude,
            longitude: measurement.longitude,
            timestamp: measurement.timestamp,
            description: reason.to_string(),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serializes_as_plain_name() {
        assert_eq!(
            serde_json::to_string(&AnomalyReason::PercentageIncrease).unwrap(),
            "\"PercentageIncrease\""
        );
        assert_eq!(AnomalyReason::ZScore.to_string(), "ZScore");
    }

    #[test]
    fn test_alert_from_measurement() {
        let m = Measurement::new("PM2.5", 20.0, 41.0, 29.0);
        let alert = AlertRecord::from_measurement(&m, AnomalyReason::Threshold);

        assert_eq!(alert.parameter, "PM2.5");
        assert_eq!(alert.value, 20.0);
        assert_eq!(alert.timestamp, m.timestamp);
        assert_eq!(alert.description, "Threshold");

        let json: serde_json::Value = serde_json::from_slice(&alert.to_vec().unwrap()).unwrap();
        for key in ["parameter", "value", "latitude", "longitude", "timestamp", "description"] {
            assert!(json.get(key).is_some(), "missing key {}", key);
        }
    }
}
