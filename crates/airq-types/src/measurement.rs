use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 输入校验错误
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Latitude {0} is out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("Longitude {0} is out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("Value {0} must be finite and non-negative")]
    InvalidValue(f64),

    #[error("Parameter cannot be empty")]
    EmptyParameter,

    #[error("Field '{field}' is not a valid number: {raw}")]
    NotANumber { field: &'static str, raw: String },
}

/// 单条传感器读数
///
/// 队列消息格式：`{latitude, longitude, parameter, value, timestamp}`。
/// `timestamp` 缺失时取解码时刻。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub latitude: f64,
    pub longitude: f64,
    pub parameter: String,
    pub value: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Measurement {
    pub fn new(parameter: impl Into<String>, value: f64, latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            parameter: parameter.into(),
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 从队列消息体解码
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// 校验坐标范围和读数
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange(self.longitude));
        }
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(ValidationError::InvalidValue(self.value));
        }
        if self.parameter.trim().is_empty() {
            return Err(ValidationError::EmptyParameter);
        }
        Ok(())
    }
}

/// 数值字段，兼容数字和数字字符串两种写法
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NumberField {
    Number(f64),
    Text(String),
}

impl NumberField {
    fn parse(self, field: &'static str) -> Result<f64, ValidationError> {
        match self {
            NumberField::Number(v) => Ok(v),
            NumberField::Text(raw) => raw
                .trim()
                .parse::<f64>()
                .map_err(|_| ValidationError::NotANumber { field, raw }),
        }
    }
}

/// HTTP 接入载荷
#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementPayload {
    pub latitude: NumberField,
    pub longitude: NumberField,
    pub parameter: String,
    pub value: NumberField,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MeasurementPayload {
    /// 解析并校验，得到可以入队的读数
    pub fn into_measurement(self) -> Result<Measurement, ValidationError> {
        let measurement = Measurement {
            latitude: self.latitude.parse("latitude")?,
            longitude: self.longitude.parse("longitude")?,
            parameter: self.parameter.trim().to_string(),
            value: self.value.parse("value")?,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        };
        measurement.validate()?;
        Ok(measurement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_without_timestamp_uses_now() {
        let before = Utc::now();
        let body = json!({
            "latitude": 41.01,
            "longitude": 28.97,
            "parameter": "PM2.5",
            "value": 12.5
        });
        let m = Measurement::from_slice(body.to_string().as_bytes()).unwrap();
        assert_eq!(m.parameter, "PM2.5");
        assert!(m.timestamp >= before);
    }

    #[test]
    fn test_decode_with_timestamp() {
        let body = r#"{"latitude":1.0,"longitude":2.0,"parameter":"O3","value":3.0,"timestamp":"2024-05-01T10:00:00Z"}"#;
        let m = Measurement::from_slice(body.as_bytes()).unwrap();
        assert_eq!(m.timestamp.to_rfc3339(), "2024-05-01T10:00:00+00:00");
    }

    #[test]
    fn test_validate_ranges() {
        assert!(Measurement::new("NO2", 10.0, 40.0, 29.0).validate().is_ok());
        assert_eq!(
            Measurement::new("NO2", 10.0, 91.0, 29.0).validate(),
            Err(ValidationError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            Measurement::new("NO2", 10.0, 40.0, -181.0).validate(),
            Err(ValidationError::LongitudeOutOfRange(-181.0))
        );
        assert!(Measurement::new("NO2", -1.0, 40.0, 29.0).validate().is_err());
        assert!(Measurement::new("NO2", f64::NAN, 40.0, 29.0).validate().is_err());
        assert!(Measurement::new("NO2", f64::INFINITY, 40.0, 29.0).validate().is_err());
        assert_eq!(
            Measurement::new("  ", 1.0, 40.0, 29.0).validate(),
            Err(ValidationError::EmptyParameter)
        );
    }

    #[test]
    fn test_payload_accepts_numeric_strings() {
        let payload: MeasurementPayload = serde_json::from_value(json!({
            "latitude": "41.0082",
            "longitude": 28.9784,
            "parameter": "PM10",
            "value": "33.1"
        }))
        .unwrap();

        let m = payload.into_measurement().unwrap();
        assert_eq!(m.latitude, 41.0082);
        assert_eq!(m.value, 33.1);
    }

    #[test]
    fn test_payload_rejects_garbage_number() {
        let payload: MeasurementPayload = serde_json::from_value(json!({
            "latitude": "north",
            "longitude": 28.9784,
            "parameter": "PM10",
            "value": 1
        }))
        .unwrap();

        match payload.into_measurement() {
            Err(ValidationError::NotANumber { field, .. }) => assert_eq!(field, "latitude"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
