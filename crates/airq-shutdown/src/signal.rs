use tokio::sync::broadcast;
use tracing::{error, info};

/// 关闭信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// SIGTERM
    Term,

    /// SIGINT / Ctrl+C
    Interrupt,

    /// 手动触发
    Manual,
}

/// 关闭信号广播器
///
/// 所有长期运行的循环（队列消费者、订阅连接）各自订阅一个接收端。
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
}

impl SignalHandler {
    pub fn new() -> (Self, broadcast::Receiver<ShutdownSignal>) {
        let (tx, rx) = broadcast::channel(16);
        (Self { shutdown_tx: tx }, rx)
    }

    /// 订阅关闭信号
    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownSignal> {
        self.shutdown_tx.subscribe()
    }

    /// 手动触发关闭
    pub fn trigger(&self, signal: ShutdownSignal) {
        info!(?signal, "Shutdown triggered");
        let _ = self.shutdown_tx.send(signal);
    }

    /// 等待已广播的关闭信号
    pub async fn wait_for_signal(&self) -> ShutdownSignal {
        let mut rx = self.subscribe();
        rx.recv().await.unwrap_or(ShutdownSignal::Manual)
    }

    /// 等待系统信号并广播
    ///
    /// 手动触发的信号同样会让它返回。
    pub async fn wait_for_system_signal(&self) -> ShutdownSignal {
        let mut manual = self.subscribe();

        let signal = tokio::select! {
            signal = os_signal() => signal,
            received = manual.recv() => {
                return received.unwrap_or(ShutdownSignal::Manual);
            }
        };

        info!(?signal, "Received system signal");
        let _ = self.shutdown_tx.send(signal);
        signal
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(unix)]
async fn os_signal() -> ShutdownSignal {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => ShutdownSignal::Term,
        _ = sigint.recv() => ShutdownSignal::Interrupt,
    }
}

#[cfg(not(unix))]
async fn os_signal() -> ShutdownSignal {
    ctrl_c().await
}

async fn ctrl_c() -> ShutdownSignal {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    ShutdownSignal::Interrupt
}
