use airq_types::{AnomalyReason, Measurement};

/// 单次评估结果
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyVerdict {
    pub is_anomalous: bool,
    pub reason: AnomalyReason,
    pub measurement: Measurement,
}

impl AnomalyVerdict {
    pub fn anomalous(measurement: Measurement, reason: AnomalyReason) -> Self {
        Self {
            is_anomalous: true,
            reason,
            measurement,
        }
    }

    pub fn normal(measurement: Measurement) -> Self {
        Self {
            is_anomalous: false,
            reason: AnomalyReason::None,
            measurement,
        }
    }
}
