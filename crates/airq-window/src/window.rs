use airq_types::Sample;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// 单个参数的滚动窗口
///
/// 样本按时间升序保存，并维护窗口内的累计和。
#[derive(Debug, Clone, Default)]
pub struct ParameterWindow {
    samples: VecDeque<Sample>,
    sum: f64,
}

impl ParameterWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(mut samples: Vec<Sample>) -> Self {
        samples.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        let sum = samples.iter().map(|s| s.value).sum();
        Self {
            samples: samples.into(),
            sum,
        }
    }

    /// 写入样本并淘汰早于 `newest - horizon` 的旧样本
    ///
    /// 乱序到达的样本按时间插入到正确位置。
    pub fn push(&mut self, sample: Sample, horizon: Duration) {
        let idx = self
            .samples
            .partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(idx, sample);
        self.sum += sample.value;

        if let Some(newest) = self.newest() {
            self.evict_before(newest - horizon);
        }
    }

    /// 淘汰 `timestamp < cutoff` 的样本，返回淘汰条数
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        while let Some(front) = self.samples.front() {
            if front.timestamp >= cutoff {
                break;
            }
            self.sum -= front.value;
            self.samples.pop_front();
            evicted += 1;
        }

        if self.samples.is_empty() {
            // 避免浮点累计误差
            self.sum = 0.0;
        }
        evicted
    }

    /// `timestamp >= cutoff` 的样本之和与条数
    pub fn sum_and_count_since(&self, cutoff: DateTime<Utc>) -> (f64, i64) {
        match self.samples.front() {
            None => (0.0, 0),
            Some(front) if front.timestamp >= cutoff => (self.sum, self.samples.len() as i64),
            Some(_) => {
                let idx = self.samples.partition_point(|s| s.timestamp < cutoff);
                self.samples
                    .range(idx..)
                    .fold((0.0, 0i64), |(sum, count), s| (sum + s.value, count + 1))
            }
        }
    }

    pub fn newest(&self) -> Option<DateTime<Utc>> {
        self.samples.back().map(|s| s.timestamp)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_accumulates() {
        let now = Utc::now();
        let mut window = ParameterWindow::new();
        let values = [3.0, 4.5, 10.0, 0.5];

        for (i, v) in values.iter().enumerate() {
            window.push(Sample::new(now + Duration::minutes(i as i64), *v), Duration::hours(24));
        }

        let (sum, count) = window.sum_and_count_since(now - Duration::hours(24));
        assert_eq!(count, 4);
        assert!((sum - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_push_evicts_outside_horizon() {
        let start = Utc::now();
        let mut window = ParameterWindow::new();

        window.push(Sample::new(start, 100.0), Duration::hours(8));
        window.push(Sample::new(start + Duration::hours(1), 10.0), Duration::hours(8));
        assert_eq!(window.len(), 2);

        // 9 小时后，第一条已超出 8 小时窗口
        window.push(Sample::new(start + Duration::hours(9), 20.0), Duration::hours(8));
        assert_eq!(window.len(), 2);

        let (sum, count) = window.sum_and_count_since(start);
        assert_eq!(count, 2);
        assert!((sum - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_order_insert() {
        let now = Utc::now();
        let mut window = ParameterWindow::new();

        window.push(Sample::new(now, 1.0), Duration::hours(24));
        window.push(Sample::new(now - Duration::hours(2), 2.0), Duration::hours(24));
        window.push(Sample::new(now - Duration::hours(1), 3.0), Duration::hours(24));

        assert_eq!(window.newest(), Some(now));
        let (sum, count) = window.sum_and_count_since(now - Duration::minutes(90));
        assert_eq!(count, 2);
        assert!((sum - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_evict_all_resets_sum() {
        let now = Utc::now();
        let mut window = ParameterWindow::from_samples(vec![
            Sample::new(now - Duration::hours(3), 0.1),
            Sample::new(now - Duration::hours(2), 0.2),
        ]);

        assert_eq!(window.evict_before(now), 2);
        assert!(window.is_empty());
        assert_eq!(window.sum_and_count_since(now - Duration::hours(24)), (0.0, 0));
    }
}
