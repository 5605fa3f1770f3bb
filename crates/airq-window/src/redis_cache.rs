use crate::cache::WindowCache;
use airq_types::Sample;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Redis 窗口缓存
///
/// 每个参数一个有序集合，score 为毫秒时间戳，member 为 `"{ts}:{value}:{uuid}"`。
/// 另有一个标记键表示该参数的窗口已经建立，空窗口也算命中。
pub struct RedisWindowCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisWindowCache {
    pub fn new(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    fn zset_key(&self, parameter: &str) -> String {
        format!("{}:{}:z", self.key_prefix, parameter)
    }

    fn marker_key(&self, parameter: &str) -> String {
        format!("{}:{}:seen", self.key_prefix, parameter)
    }
}

fn encode_member(sample: &Sample) -> String {
    format!(
        "{}:{}:{}",
        sample.timestamp.timestamp_millis(),
        sample.value,
        uuid::Uuid::new_v4()
    )
}

fn decode_value(member: &str) -> Option<f64> {
    let mut parts = member.splitn(3, ':');
    parts.next()?;
    parts.next()?.parse().ok()
}

fn ttl_secs(horizon: Duration) -> i64 {
    // 多留一小时，避免边界上的样本被提前过期
    (horizon + Duration::hours(1)).num_seconds().max(1)
}

#[async_trait]
impl WindowCache for RedisWindowCache {
    async fn get(&self, parameter: &str, cutoff: DateTime<Utc>) -> Result<Option<(f64, i64)>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (seen, members): (bool, Vec<String>) = redis::pipe()
            .exists(self.marker_key(parameter))
            .cmd("ZRANGEBYSCORE")
            .arg(self.zset_key(parameter))
            .arg(cutoff.timestamp_millis())
            .arg("+inf")
            .query_async(&mut conn)
            .await?;

        if !seen {
            return Ok(None);
        }

        let (sum, count) = members
            .iter()
            .filter_map(|m| decode_value(m))
            .fold((0.0, 0i64), |(sum, count), v| (sum + v, count + 1));
        Ok(Some((sum, count)))
    }

    async fn set(&self, parameter: &str, samples: Vec<Sample>, horizon: Duration) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.zset_key(parameter);
        let marker = self.marker_key(parameter);
        let ttl = ttl_secs(horizon);

        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        if !samples.is_empty() {
            let items: Vec<(i64, String)> = samples
                .iter()
                .map(|s| (s.timestamp.timestamp_millis(), encode_member(s)))
                .collect();
            pipe.zadd_multiple(&key, &items).ignore();
            pipe.cmd("EXPIRE").arg(&key).arg(ttl).ignore();
        }
        pipe.cmd("SET").arg(&marker).arg(1).arg("EX").arg(ttl).ignore();

        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn push(&self, parameter: &str, sample: Sample, horizon: Duration) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.zset_key(parameter);
        let ts = sample.timestamp.timestamp_millis();
        let oldest = (sample.timestamp - horizon).timestamp_millis();
        let ttl = ttl_secs(horizon);

        redis::pipe()
            .atomic()
            .zadd(&key, encode_member(&sample), ts)
            .ignore()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(format!("({}", oldest))
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ttl)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    fn name(&self) -> &str {
        "redis"
    }
}
