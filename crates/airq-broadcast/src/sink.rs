use async_trait::async_trait;

/// 订阅者的写端
///
/// 只由 `SubscriberRegistry` 在持锁期间调用。
#[async_trait]
pub trait SubscriberSink: Send {
    /// 推送一条 JSON 消息
    async fn send(&mut self, payload: &[u8]) -> anyhow::Result<()>;

    /// 关闭连接，错误忽略
    async fn close(&mut self);
}
