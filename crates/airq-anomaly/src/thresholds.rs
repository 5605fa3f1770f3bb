use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// WHO 参考限值（µg/m³）
///
/// 未登记的参数不参与阈值判断。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    limits: HashMap<String, f64>,
}

impl ThresholdTable {
    pub fn empty() -> Self {
        Self {
            limits: HashMap::new(),
        }
    }

    pub fn with_limit(mut self, parameter: impl Into<String>, limit: f64) -> Self {
        self.limits.insert(parameter.into(), limit);
        self
    }

    pub fn limit(&self, parameter: &str) -> Option<f64> {
        self.limits.get(parameter).copied()
    }

    /// `value` 是否严格超过该参数的限值
    pub fn exceeds(&self, parameter: &str, value: f64) -> bool {
        self.limit(parameter).map_or(false, |limit| value > limit)
    }

    /// 已登记的参数名，按字母序
    pub fn parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.limits.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.limits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limits.is_empty()
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::empty()
            .with_limit("PM2.5", 15.0)
            .with_limit("PM10", 45.0)
            .with_limit("NO2", 25.0)
            .with_limit("SO2", 40.0)
            .with_limit("O3", 100.0)
    }
}
