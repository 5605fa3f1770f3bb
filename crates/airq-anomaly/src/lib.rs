pub mod evaluator;
pub mod rule;
pub mod thresholds;
pub mod verdict;

pub use evaluator::Evaluator;
pub use rule::{
    AnomalyRule, GeospatialRule, PercentageIncreaseRule, ThresholdRule, TimeSeriesRule,
    ZScoreRule,
};
pub use thresholds::ThresholdTable;
pub use verdict::AnomalyVerdict;
