use crate::connection::ConnectionTracker;
use crate::signal::{ShutdownSignal, SignalHandler};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// 关闭阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    Running,
    Draining,
    Stopping,
    Complete,
}

/// 关闭结果
#[derive(Debug, Clone, PartialEq)]
pub struct ShutdownReport {
    pub signal: ShutdownSignal,
    pub remaining_connections: usize,
    pub tasks_finished: usize,
    pub tasks_aborted: usize,
    pub elapsed: Duration,
}

/// 关闭协调器
///
/// 收到信号后：广播关闭 → 排空订阅连接 → 等待后台任务退出（超时则 abort）。
pub struct ShutdownCoordinator {
    signal_handler: SignalHandler,
    connection_tracker: Option<ConnectionTracker>,
    tasks: Vec<(String, JoinHandle<()>)>,
    drain_timeout: Duration,
    task_timeout: Duration,
    phase_tx: watch::Sender<ShutdownPhase>,
}

impl ShutdownCoordinator {
    pub fn builder() -> ShutdownCoordinatorBuilder {
        ShutdownCoordinatorBuilder::new()
    }

    pub fn signal_handler(&self) -> &SignalHandler {
        &self.signal_handler
    }

    pub fn phase(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase_tx.subscribe()
    }

    /// 登记一个需要在关闭时等待的后台任务
    pub fn register_task(&mut self, name: impl Into<String>, handle: JoinHandle<()>) {
        self.tasks.push((name.into(), handle));
    }

    /// 等待关闭信号并执行关闭流程
    pub async fn run(self) -> ShutdownReport {
        info!("Shutdown coordinator waiting for signal");
        let signal = self.signal_handler.wait_for_system_signal().await;
        self.shutdown(signal).await
    }

    /// 按给定信号立即执行关闭流程
    pub async fn shutdown(self, signal: ShutdownSignal) -> ShutdownReport {
        let start = Instant::now();
        self.signal_handler.trigger(signal);

        self.phase_tx.send_replace(ShutdownPhase::Draining);
        let remaining_connections = match &self.connection_tracker {
            Some(tracker) => tracker.drain(self.drain_timeout).await,
            None => 0,
        };

        self.phase_tx.send_replace(ShutdownPhase::Stopping);
        let mut tasks_finished = 0;
        let mut tasks_aborted = 0;
        for (name, mut handle) in self.tasks {
            match timeout(self.task_timeout, &mut handle).await {
                Ok(Ok(())) => tasks_finished += 1,
                Ok(Err(e)) => {
                    warn!(task = %name, error = %e, "Task ended abnormally");
                    tasks_finished += 1;
                }
                Err(_) => {
                    warn!(task = %name, timeout = ?self.task_timeout, "Task did not stop in time, aborting");
                    handle.abort();
                    tasks_aborted += 1;
                }
            }
        }

        self.phase_tx.send_replace(ShutdownPhase::Complete);
        let elapsed = start.elapsed();
        info!(?signal, ?elapsed, tasks_finished, tasks_aborted, "Graceful shutdown complete");

        ShutdownReport {
            signal,
            remaining_connections,
            tasks_finished,
            tasks_aborted,
            elapsed,
        }
    }
}

/// 关闭协调器构建器
pub struct ShutdownCoordinatorBuilder {
    signal_handler: Option<SignalHandler>,
    connection_tracker: Option<ConnectionTracker>,
    drain_timeout: Duration,
    task_timeout: Duration,
}

impl ShutdownCoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            signal_handler: None,
            connection_tracker: None,
            drain_timeout: Duration::from_secs(10),
            task_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_signal_handler(mut self, handler: SignalHandler) -> Self {
        self.signal_handler = Some(handler);
        self
    }

    pub fn with_connection_tracker(mut self, tracker: ConnectionTracker) -> Self {
        self.connection_tracker = Some(tracker);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn build(self) -> ShutdownCoordinator {
        let (phase_tx, _) = watch::channel(ShutdownPhase::Running);
        ShutdownCoordinator {
            signal_handler: self.signal_handler.unwrap_or_default(),
            connection_tracker: self.connection_tracker,
            tasks: Vec::new(),
            drain_timeout: self.drain_timeout,
            task_timeout: self.task_timeout,
            phase_tx,
        }
    }
}

impl Default for ShutdownCoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
