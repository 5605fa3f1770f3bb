use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// 默认窗口（小时）
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

/// 臭氧窗口（小时），对应 WHO 8 小时平均限值
pub const OZONE_WINDOW_HOURS: i64 = 8;

/// 各参数的滚动窗口长度
///
/// 阈值按对应的平均周期标定：O3 为 8 小时，其余参数为 24 小时。
#[derive(Debug, Clone)]
pub struct WindowPolicy {
    default_window: Duration,
    overrides: HashMap<String, Duration>,
}

impl WindowPolicy {
    pub fn new(default_window: Duration) -> Self {
        Self {
            default_window,
            overrides: HashMap::new(),
        }
    }

    pub fn with_window(mut self, parameter: impl Into<String>, window: Duration) -> Self {
        self.overrides.insert(parameter.into(), window);
        self
    }

    pub fn window_for(&self, parameter: &str) -> Duration {
        self.overrides
            .get(parameter)
            .copied()
            .unwrap_or(self.default_window)
    }

    /// 窗口起点：`at - window`
    pub fn cutoff_for(&self, parameter: &str, at: DateTime<Utc>) -> DateTime<Utc> {
        at - self.window_for(parameter)
    }
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_WINDOW_HOURS))
            .with_window("O3", Duration::hours(OZONE_WINDOW_HOURS))
    }
}
