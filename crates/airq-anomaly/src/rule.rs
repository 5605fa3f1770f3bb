use crate::thresholds::ThresholdTable;
use airq_types::{AnomalyReason, Measurement, WindowAggregate};

/// 百分比增长倍数：读数超过均值的 1.5 倍
pub const PERCENTAGE_INCREASE_FACTOR: f64 = 1.5;

/// Z-score 阈值
pub const Z_SCORE_LIMIT: f64 = 3.0;

/// 异常规则
///
/// 规则是纯函数，不做 I/O，也不会失败。
pub trait AnomalyRule: Send + Sync {
    fn name(&self) -> &str;
    fn reason(&self) -> AnomalyReason;
    fn matches(&self, measurement: &Measurement, aggregate: &WindowAggregate) -> bool;
}

/// 固定阈值规则
#[derive(Debug, Clone, Default)]
pub struct ThresholdRule {
    table: ThresholdTable,
}

impl ThresholdRule {
    pub fn new(table: ThresholdTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ThresholdTable {
        &self.table
    }
}

impl AnomalyRule for ThresholdRule {
    fn name(&self) -> &str {
        "threshold"
    }

    fn reason(&self) -> AnomalyReason {
        AnomalyReason::Threshold
    }

    fn matches(&self, measurement: &Measurement, _aggregate: &WindowAggregate) -> bool {
        self.table.exceeds(&measurement.parameter, measurement.value)
    }
}

/// 相对窗口均值的增长规则
#[derive(Debug, Clone)]
pub struct PercentageIncreaseRule {
    factor: f64,
}

impl PercentageIncreaseRule {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

impl Default for PercentageIncreaseRule {
    fn default() -> Self {
        Self::new(PERCENTAGE_INCREASE_FACTOR)
    }
}

impl AnomalyRule for PercentageIncreaseRule {
    fn name(&self) -> &str {
        "percentage_increase"
    }

    fn reason(&self) -> AnomalyReason {
        AnomalyReason::PercentageIncrease
    }

    fn matches(&self, measurement: &Measurement, aggregate: &WindowAggregate) -> bool {
        match aggregate.average() {
            Some(avg) => measurement.value > self.factor * avg,
            None => false,
        }
    }
}

/// Z-score 规则
///
/// 没有跟踪方差，标准差近似为 `sqrt(average)`。
#[derive(Debug, Clone)]
pub struct ZScoreRule {
    limit: f64,
}

impl ZScoreRule {
    pub fn new(limit: f64) -> Self {
        Self { limit }
    }

    pub fn z_score(value: f64, average: f64) -> Option<f64> {
        let std_dev = average.sqrt();
        if !(std_dev > 0.0) {
            return None;
        }
        Some((value - average) / std_dev)
    }
}

impl Default for ZScoreRule {
    fn default() -> Self {
        Self::new(Z_SCORE_LIMIT)
    }
}

impl AnomalyRule for ZScoreRule {
    fn name(&self) -> &str {
        "z_score"
    }

    fn reason(&self) -> AnomalyReason {
        AnomalyReason::ZScore
    }

    fn matches(&self, measurement: &Measurement, aggregate: &WindowAggregate) -> bool {
        aggregate
            .average()
            .and_then(|avg| Self::z_score(measurement.value, avg))
            .map_or(false, |z| z.abs() > self.limit)
    }
}

/// 时间序列规则（扩展位，目前不触发）
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesRule;

impl AnomalyRule for TimeSeriesRule {
    fn name(&self) -> &str {
        "time_series"
    }

    fn reason(&self) -> AnomalyReason {
        AnomalyReason::TimeSeries
    }

    fn matches(&self, _measurement: &Measurement, _aggregate: &WindowAggregate) -> bool {
        false
    }
}

/// 空间邻近规则（扩展位，目前不触发）
#[derive(Debug, Clone, Default)]
pub struct GeospatialRule;

impl AnomalyRule for GeospatialRule {
    fn name(&self) -> &str {
        "geospatial"
    }

    fn reason(&self) -> AnomalyReason {
        AnomalyReason::Geospatial
    }

    fn matches(&self, _measurement: &Measurement, _aggregate: &WindowAggregate) -> bool {
        false
    }
}
