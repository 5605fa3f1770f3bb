use crate::error::BroadcastError;
use crate::registry::{Registration, SubscriberRegistry};
use crate::sink::SubscriberSink;
use airq_shutdown::{ConnectionTracker, SignalHandler};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[async_trait]
impl SubscriberSink for SplitSink<WebSocket, Message> {
    async fn send(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let text = String::from_utf8_lossy(payload).into_owned();
        SinkExt::send(self, Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = SinkExt::send(self, Message::Close(None)).await;
        let _ = SinkExt::close(self).await;
    }
}

/// 订阅入口：注册表 + 连接跟踪 + 关闭信号
#[derive(Clone)]
pub struct SubscriberHub {
    registry: Arc<SubscriberRegistry>,
    tracker: ConnectionTracker,
    shutdown: SignalHandler,
}

impl SubscriberHub {
    pub fn new(registry: Arc<SubscriberRegistry>, tracker: ConnectionTracker, shutdown: SignalHandler) -> Self {
        Self {
            registry,
            tracker,
            shutdown,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// 登记一个订阅者，未提供 id 时分配 UUID
    pub async fn subscribe(
        &self,
        client_id: Option<String>,
        sink: Box<dyn SubscriberSink>,
    ) -> Result<(String, Registration), BroadcastError> {
        if self.tracker.is_shutting_down() {
            return Err(BroadcastError::ShuttingDown);
        }

        let id = client_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let registration = self.registry.register(&id, sink).await?;
        Ok((id, registration))
    }
}

/// 服务一个已升级的 WebSocket 连接
///
/// 客户端发来的帧只用于检测断开，不作为命令解析。
pub async fn serve_socket(hub: SubscriberHub, socket: WebSocket, client_id: Option<String>) {
    let Some(_guard) = hub.tracker.acquire() else {
        let mut socket = socket;
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    // 先订阅关闭信号，登记期间触发的关闭不会丢失
    let mut shutdown = hub.shutdown.subscribe();
    let (sender, mut receiver) = socket.split();
    let (id, registration) = match hub.subscribe(client_id, Box::new(sender)).await {
        Ok(registered) => registered,
        Err(e) => {
            warn!(error = %e, "Subscriber handshake failed");
            return;
        }
    };

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(subscriber = %id, error = %e, "Subscriber read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
            _ = shutdown.recv() => break,
        }
    }

    if hub.registry.remove(&id, registration.generation).await {
        info!(subscriber = %id, "Subscriber disconnected");
    }
}
