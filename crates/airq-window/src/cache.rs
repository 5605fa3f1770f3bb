use crate::window::ParameterWindow;
use airq_types::Sample;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// 窗口缓存 trait
///
/// 缓存只是加速层，持久化存储才是数据的最终来源。
#[async_trait]
pub trait WindowCache: Send + Sync {
    /// 查询 `timestamp >= cutoff` 的和与条数
    ///
    /// # Returns
    /// * `Ok(Some((sum, count)))` 缓存命中
    /// * `Ok(None)` 缓存中没有该参数的窗口
    /// * `Err(e)` 缓存不可用
    async fn get(&self, parameter: &str, cutoff: DateTime<Utc>) -> anyhow::Result<Option<(f64, i64)>>;

    /// 用回源得到的样本整体替换该参数的窗口
    async fn set(&self, parameter: &str, samples: Vec<Sample>, horizon: Duration) -> anyhow::Result<()>;

    /// 追加一个样本，顺带淘汰超出 `horizon` 的旧样本
    ///
    /// 该参数的窗口尚未由 `set` 建立时不做任何事，下一次查询按未命中回源。
    async fn push(&self, parameter: &str, sample: Sample, horizon: Duration) -> anyhow::Result<()>;

    /// 缓存名称
    fn name(&self) -> &str;
}

/// 内存窗口缓存
///
/// 每个参数一个窗口，按分片加锁，不同参数之间互不阻塞。
#[derive(Default)]
pub struct MemoryWindowCache {
    windows: DashMap<String, ParameterWindow>,
}

impl MemoryWindowCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前缓存的参数个数
    pub fn parameter_count(&self) -> usize {
        self.windows.len()
    }

    /// 删除某个参数的窗口
    pub fn invalidate(&self, parameter: &str) {
        self.windows.remove(parameter);
    }
}

#[async_trait]
impl WindowCache for MemoryWindowCache {
    async fn get(&self, parameter: &str, cutoff: DateTime<Utc>) -> anyhow::Result<Option<(f64, i64)>> {
        Ok(self
            .windows
            .get(parameter)
            .map(|window| window.sum_and_count_since(cutoff)))
    }

    async fn set(&self, parameter: &str, samples: Vec<Sample>, horizon: Duration) -> anyhow::Result<()> {
        let mut window = ParameterWindow::from_samples(samples);
        if let Some(newest) = window.newest() {
            window.evict_before(newest - horizon);
        }
        self.windows.insert(parameter.to_string(), window);
        Ok(())
    }

    async fn push(&self, parameter: &str, sample: Sample, horizon: Duration) -> anyhow::Result<()> {
        if let Some(mut window) = self.windows.get_mut(parameter) {
            window.push(sample, horizon);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
