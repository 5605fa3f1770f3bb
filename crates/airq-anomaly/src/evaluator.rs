use crate::rule::{
    AnomalyRule, GeospatialRule, PercentageIncreaseRule, ThresholdRule, TimeSeriesRule,
    ZScoreRule,
};
use crate::thresholds::ThresholdTable;
use crate::verdict::AnomalyVerdict;
use airq_types::{Measurement, WindowAggregate};
use tracing::trace;

/// 异常评估器
///
/// 按注册顺序依次评估规则，第一个命中的规则决定 `reason`。
pub struct Evaluator {
    rules: Vec<Box<dyn AnomalyRule>>,
}

impl Evaluator {
    /// 不含任何规则的评估器
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// 标准规则链：Threshold → PercentageIncrease → ZScore → TimeSeries → Geospatial
    pub fn standard() -> Self {
        Self::with_thresholds(ThresholdTable::default())
    }

    pub fn with_thresholds(table: ThresholdTable) -> Self {
        Self::empty()
            .with_rule(ThresholdRule::new(table))
            .with_rule(PercentageIncreaseRule::default())
            .with_rule(ZScoreRule::default())
            .with_rule(TimeSeriesRule)
            .with_rule(GeospatialRule)
    }

    /// 追加一条规则（优先级最低）
    pub fn with_rule(mut self, rule: impl AnomalyRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn evaluate(&self, measurement: &Measurement, aggregate: &WindowAggregate) -> AnomalyVerdict {
        for rule in &self.rules {
            if rule.matches(measurement, aggregate) {
                trace!(
                    rule = rule.name(),
                    parameter = %measurement.parameter,
                    value = measurement.value,
                    "Anomaly rule matched"
                );
                return AnomalyVerdict::anomalous(measurement.clone(), rule.reason());
            }
        }
        AnomalyVerdict::normal(measurement.clone())
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airq_types::AnomalyReason;
    use chrono::{Duration, Utc};

    fn aggregate(sum: f64, count: i64) -> WindowAggregate {
        let now = Utc::now();
        WindowAggregate::new(sum, count, now - Duration::hours(24), now)
    }

    fn measurement(parameter: &str, value: f64) -> Measurement {
        Measurement::new(parameter, value, 41.01, 28.97)
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(
            Evaluator::standard().rule_names(),
            vec!["threshold", "percentage_increase", "z_score", "time_series", "geospatial"]
        );
    }

    #[test]
    fn test_threshold_fires_without_history() {
        let verdict = Evaluator::standard().evaluate(&measurement("PM2.5", 20.0), &aggregate(0.0, 0));
        assert!(verdict.is_anomalous);
        assert_eq!(verdict.reason, AnomalyReason::Threshold);
        assert_eq!(verdict.measurement.value, 20.0);
    }

    #[test]
    fn test_threshold_fires_regardless_of_history() {
        let evaluator = Evaluator::standard();
        for (sum, count) in [(0.0, 0), (160.0, 10), (1e6, 3)] {
            let verdict = evaluator.evaluate(&measurement("SO2", 41.0), &aggregate(sum, count));
            assert_eq!(verdict.reason, AnomalyReason::Threshold);
        }
    }

    #[test]
    fn test_only_threshold_can_fire_without_history() {
        let evaluator = Evaluator::standard();
        let empty = aggregate(0.0, 0);

        // 低于阈值，且无历史：不可能是百分比或 Z-score
        for value in [0.0, 1.0, 14.9, 15.0] {
            let verdict = evaluator.evaluate(&measurement("PM2.5", value), &empty);
            assert!(!verdict.is_anomalous);
            assert_eq!(verdict.reason, AnomalyReason::None);
        }

        let verdict = evaluator.evaluate(&measurement("CO", 1e9), &empty);
        assert_eq!(verdict.reason, AnomalyReason::None);
    }

    #[test]
    fn test_z_score_after_percentage_miss() {
        // 均值 50，72 < 75 不触发百分比，z ≈ 3.11 触发 Z-score
        let verdict = Evaluator::standard().evaluate(&measurement("O3", 72.0), &aggregate(500.0, 10));
        assert!(verdict.is_anomalous);
        assert_eq!(verdict.reason, AnomalyReason::ZScore);
    }

    #[test]
    fn test_percentage_increase_before_z_score() {
        // 均值 20，35 > 30 且 z ≈ 3.35，两条都满足，取百分比
        let verdict = Evaluator::standard().evaluate(&measurement("O3", 35.0), &aggregate(200.0, 10));
        assert_eq!(verdict.reason, AnomalyReason::PercentageIncrease);
    }

    #[test]
    fn test_first_match_wins() {
        // 同时满足阈值和百分比增长
        let m = measurement("NO2", 60.0);
        let agg = aggregate(100.0, 10);
        assert!(PercentageIncreaseRule::default().matches(&m, &agg));

        let verdict = Evaluator::standard().evaluate(&m, &agg);
        assert_eq!(verdict.reason, AnomalyReason::Threshold);
    }

    #[test]
    fn test_normal_reading() {
        let verdict = Evaluator::standard().evaluate(&measurement("PM10", 30.0), &aggregate(280.0, 10));
        assert!(!verdict.is_anomalous);
        assert_eq!(verdict.reason, AnomalyReason::None);
    }

    #[test]
    fn test_custom_rule_is_appended() {
        struct AlwaysGeo;

        impl AnomalyRule for AlwaysGeo {
            fn name(&self) -> &str {
                "always_geo"
            }

            fn reason(&self) -> AnomalyReason {
                AnomalyReason::Geospatial
            }

            fn matches(&self, _: &Measurement, _: &WindowAggregate) -> bool {
                true
            }
        }

        let evaluator = Evaluator::standard().with_rule(AlwaysGeo);
        assert_eq!(
            evaluator.evaluate(&measurement("PM10", 1.0), &aggregate(0.0, 0)).reason,
            AnomalyReason::Geospatial
        );
        assert_eq!(
            evaluator.evaluate(&measurement("PM10", 50.0), &aggregate(0.0, 0)).reason,
            AnomalyReason::Threshold
        );
    }
}
