use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 窗口内的一个带时间戳的读数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// 某个参数在滚动窗口内的聚合结果
///
/// 窗口为 `[window_start, window_end]`，统计 `timestamp >= window_start` 的读数。
/// `count == 0` 表示还没有历史数据，此时 `average()` 返回 `None`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowAggregate {
    pub sum: f64,
    pub count: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

impl WindowAggregate {
    pub fn new(sum: f64, count: i64, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self {
            sum,
            count: count.max(0),
            window_start,
            window_end,
        }
    }

    pub fn empty(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Self {
        Self::new(0.0, 0, window_start, window_end)
    }

    /// 从样本集合计算聚合，只统计 `timestamp >= window_start` 的样本
    pub fn from_samples<'a>(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        samples: impl IntoIterator<Item = &'a Sample>,
    ) -> Self {
        let (sum, count) = samples
            .into_iter()
            .filter(|s| s.timestamp >= window_start)
            .fold((0.0, 0i64), |(sum, count), s| (sum + s.value, count + 1));
        Self::new(sum, count, window_start, window_end)
    }

    pub fn is_empty(&self) -> bool {
        self.count <= 0
    }

    pub fn average(&self) -> Option<f64> {
        if self.is_empty() {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_empty_has_no_average() {
        let now = Utc::now();
        let agg = WindowAggregate::empty(now, now);
        assert!(agg.is_empty());
        assert_eq!(agg.average(), None);
    }

    #[test]
    fn test_from_samples_respects_cutoff() {
        let now = Utc::now();
        let samples = vec![
            Sample::new(now - Duration::hours(30), 100.0),
            Sample::new(now - Duration::hours(2), 10.0),
            Sample::new(now, 20.0),
        ];

        let agg = WindowAggregate::from_samples(now - Duration::hours(24), now, &samples);
        assert_eq!(agg.count, 2);
        assert_eq!(agg.sum, 30.0);
        assert_eq!(agg.average(), Some(15.0));
    }

    #[test]
    fn test_negative_count_is_clamped() {
        let now = Utc::now();
        let agg = WindowAggregate::new(5.0, -3, now, now);
        assert_eq!(agg.count, 0);
        assert_eq!(agg.average(), None);
    }
}
