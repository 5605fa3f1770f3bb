use crate::cache::{MemoryWindowCache, WindowCache};
use crate::policy::WindowPolicy;
use airq_core::SharedRecordStore;
use airq_types::{Measurement, Sample, WindowAggregate};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 滚动窗口聚合存储
///
/// 读路径为 cache-aside：先查缓存，未命中或缓存出错时从持久化存储重新聚合，
/// 再用回源样本重建缓存。缓存写入失败只记录日志，不影响读路径。
#[derive(Clone)]
pub struct WindowStore {
    cache: Arc<dyn WindowCache>,
    source: Option<SharedRecordStore>,
    policy: WindowPolicy,
}

impl WindowStore {
    pub fn new(cache: Arc<dyn WindowCache>) -> Self {
        Self {
            cache,
            source: None,
            policy: WindowPolicy::default(),
        }
    }

    /// 仅内存缓存，无回源
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryWindowCache::new()))
    }

    pub fn with_source(mut self, source: SharedRecordStore) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_policy(mut self, policy: WindowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// 写入一条读数
    ///
    /// 有回源时只追加到已建立的窗口，未建立的窗口留给下一次查询回源重建；
    /// 没有回源时缓存就是全部历史，首条读数直接建立窗口。
    pub async fn update(&self, parameter: &str, value: f64, timestamp: DateTime<Utc>) {
        let horizon = self.policy.window_for(parameter);
        let sample = Sample::new(timestamp, value);

        let result = if self.source.is_some() {
            self.cache.push(parameter, sample, horizon).await
        } else {
            self.append_without_source(parameter, sample, horizon).await
        };

        if let Err(e) = result {
            warn!(
                cache = self.cache.name(),
                parameter = %parameter,
                error = %e,
                "Failed to update window cache"
            );
        }
    }

    async fn append_without_source(&self, parameter: &str, sample: Sample, horizon: Duration) -> anyhow::Result<()> {
        match self.cache.get(parameter, DateTime::<Utc>::MIN_UTC).await? {
            Some(_) => self.cache.push(parameter, sample, horizon).await,
            None => self.cache.set(parameter, vec![sample], horizon).await,
        }
    }

    /// 查询 `timestamp >= cutoff` 的聚合
    pub async fn query(&self, parameter: &str, cutoff: DateTime<Utc>) -> WindowAggregate {
        let window_end = cutoff + self.policy.window_for(parameter);

        match self.cache.get(parameter, cutoff).await {
            Ok(Some((sum, count))) => {
                return WindowAggregate::new(sum, count, cutoff, window_end);
            }
            Ok(None) => {
                debug!(cache = self.cache.name(), parameter = %parameter, "Window cache miss");
            }
            Err(e) => {
                warn!(
                    cache = self.cache.name(),
                    parameter = %parameter,
                    error = %e,
                    "Window cache unavailable, falling back to record store"
                );
            }
        }

        let Some(source) = &self.source else {
            return WindowAggregate::empty(cutoff, window_end);
        };

        let aggregate = match source.sum_and_count(parameter, cutoff).await {
            Ok((sum, count)) => WindowAggregate::new(sum, count, cutoff, window_end),
            Err(e) => {
                warn!(parameter = %parameter, error = %e, "Fallback aggregation failed");
                return WindowAggregate::empty(cutoff, window_end);
            }
        };

        self.repopulate(parameter, cutoff).await;
        aggregate
    }

    /// 按读数自身时间戳和参数窗口查询聚合
    pub async fn aggregate_for(&self, measurement: &Measurement) -> WindowAggregate {
        let cutoff = self
            .policy
            .cutoff_for(&measurement.parameter, measurement.timestamp);
        self.query(&measurement.parameter, cutoff).await
    }

    /// 启动时为已知参数预热缓存，返回成功预热的参数个数
    pub async fn warm_up(&self, parameters: &[&str], now: DateTime<Utc>) -> usize {
        if self.source.is_none() {
            return 0;
        }

        let mut warmed = 0;
        for parameter in parameters {
            let cutoff = self.policy.cutoff_for(parameter, now);
            if self.repopulate(parameter, cutoff).await {
                warmed += 1;
            }
        }

        info!(warmed, total = parameters.len(), cache = self.cache.name(), "Window cache warmed up");
        warmed
    }

    async fn repopulate(&self, parameter: &str, cutoff: DateTime<Utc>) -> bool {
        let Some(source) = &self.source else {
            return false;
        };

        let samples = match source.samples_since(parameter, cutoff).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!(parameter = %parameter, error = %e, "Failed to load samples for cache");
                return false;
            }
        };

        let loaded = samples.len();
        match self
            .cache
            .set(parameter, samples, self.policy.window_for(parameter))
            .await
        {
            Ok(()) => {
                debug!(parameter = %parameter, samples = loaded, "Window cache repopulated");
                true
            }
            Err(e) => {
                warn!(parameter = %parameter, error = %e, "Failed to repopulate window cache");
                false
            }
        }
    }
}
