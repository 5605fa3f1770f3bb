use crate::api::create_router;
use crate::config::{AppConfig, CacheBackend, CacheConfig, QueueBackend, QueueConfig};
use crate::AppState;
use airq_anomaly::{Evaluator, ThresholdTable};
use airq_broadcast::{AlertConsumer, SubscriberHub, SubscriberRegistry};
use airq_core::{SeaOrmRecordStore, SharedRecordStore};
use airq_processor::{AlertPublisher, MeasurementConsumer};
use airq_queue::{MemoryBroker, QueueOptions, SharedBroker};
use airq_shutdown::{ConnectionTracker, ShutdownCoordinator, SignalHandler};
use airq_window::{MemoryWindowCache, WindowCache, WindowStore};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const TASK_TIMEOUT: Duration = Duration::from_secs(15);

/// 读数队列的消费选项
pub fn measurement_queue_options(config: &QueueConfig) -> QueueOptions {
    QueueOptions::default()
        .with_ack_mode(config.ack_mode)
        .with_prefetch(config.prefetch)
}

/// 按配置连接消息代理，连接失败属于启动错误
pub async fn connect_broker(config: &QueueConfig) -> anyhow::Result<SharedBroker> {
    match config.backend {
        QueueBackend::Memory => {
            warn!("Using in-memory broker, messages are not durable");
            Ok(Arc::new(MemoryBroker::new()))
        }
        #[cfg(feature = "amqp")]
        QueueBackend::Amqp => {
            let broker = airq_queue::AmqpBroker::connect(&config.url)
                .await
                .context("Failed to connect to AMQP broker")?;
            Ok(Arc::new(broker))
        }
        #[cfg(not(feature = "amqp"))]
        QueueBackend::Amqp => anyhow::bail!("AMQP backend requested but the 'amqp' feature is disabled"),
    }
}

/// 按配置构建窗口缓存
pub fn build_cache(config: &CacheConfig) -> anyhow::Result<Arc<dyn WindowCache>> {
    match config.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryWindowCache::new())),
        #[cfg(feature = "redis-cache")]
        CacheBackend::Redis => {
            let cache = airq_window::RedisWindowCache::new(&config.url, config.key_prefix.clone())
                .context("Invalid Redis URL")?;
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis-cache"))]
        CacheBackend::Redis => anyhow::bail!("Redis cache requested but the 'redis-cache' feature is disabled"),
    }
}

/// 组装并运行整个进程，直到收到关闭信号
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    if config.metrics.enabled {
        let addr = config
            .metrics
            .listen
            .parse()
            .context("Invalid metrics listen address")?;
        crate::metrics::init_metrics(addr)?;
    }

    // 持久化存储
    let store = SeaOrmRecordStore::connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    store.ensure_schema().await.context("Failed to provision schema")?;
    let records: SharedRecordStore = Arc::new(store);
    info!("Record store ready");

    // 消息代理与队列
    let broker = connect_broker(&config.queue).await?;
    let measurement_options = measurement_queue_options(&config.queue);
    let alert_options = QueueOptions::default();

    let measurement_queue = broker
        .consumer(&config.queue.measurement_queue, &measurement_options)
        .await
        .context("Failed to consume measurement queue")?;
    let alert_queue = broker
        .consumer(&config.queue.alert_queue, &alert_options)
        .await
        .context("Failed to consume alert queue")?;
    let ingest = broker
        .publisher(&config.queue.measurement_queue, &measurement_options)
        .await
        .context("Failed to open measurement publisher")?;
    let alerts = broker
        .publisher(&config.queue.alert_queue, &alert_options)
        .await
        .context("Failed to open alert publisher")?;
    info!(broker = broker.name(), ack_mode = ?measurement_options.ack_mode, "Queues declared");

    // 窗口与评估器
    let thresholds = ThresholdTable::default();
    let window = WindowStore::new(build_cache(&config.cache)?).with_source(records.clone());
    window.warm_up(&thresholds.parameters(), Utc::now()).await;
    let evaluator = Arc::new(Evaluator::with_thresholds(thresholds));

    // 关闭协调
    let (signals, _) = SignalHandler::new();
    let tracker = ConnectionTracker::new();
    let mut coordinator = ShutdownCoordinator::builder()
        .with_signal_handler(signals.clone())
        .with_connection_tracker(tracker.clone())
        .with_drain_timeout(DRAIN_TIMEOUT)
        .with_task_timeout(TASK_TIMEOUT)
        .build();

    // 读数消费者
    let consumer = MeasurementConsumer::new(
        window,
        records.clone(),
        evaluator,
        AlertPublisher::new(alerts),
    );
    let shutdown_rx = signals.subscribe();
    coordinator.register_task(
        "measurement-consumer",
        tokio::spawn(async move {
            consumer.run(measurement_queue, shutdown_rx).await;
        }),
    );

    // 告警消费者与订阅者
    let registry = Arc::new(
        SubscriberRegistry::new(records.clone())
            .with_snapshot_window(chrono::Duration::seconds(config.alerts.snapshot_window_secs)),
    );
    let alert_consumer = AlertConsumer::new(records.clone(), registry.clone());
    let shutdown_rx = signals.subscribe();
    coordinator.register_task(
        "alert-consumer",
        tokio::spawn(async move {
            alert_consumer.run(alert_queue, shutdown_rx).await;
        }),
    );

    // HTTP 服务
    let hub = SubscriberHub::new(registry.clone(), tracker, signals.clone());
    let state = Arc::new(AppState {
        records,
        ingest,
        hub,
    });
    let addr = config.server.socket_addr()?;
    let server = axum::Server::try_bind(&addr)
        .with_context(|| format!("Failed to bind {}", addr))?
        .serve(create_router(state).into_make_service());
    info!("HTTP server listening on {}", addr);

    let mut shutdown_rx = signals.subscribe();
    coordinator.register_task(
        "http-server",
        tokio::spawn(async move {
            let graceful = server.with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            });
            if let Err(e) = graceful.await {
                tracing::error!(error = %e, "HTTP server error");
            }
        }),
    );

    let report = coordinator.run().await;

    let closed = registry.close_all().await;
    if let Err(e) = broker.close().await {
        warn!(error = %e, "Failed to close broker");
    }
    info!(
        signal = ?report.signal,
        remaining_connections = report.remaining_connections,
        subscribers_closed = closed,
        "Server stopped"
    );
    Ok(())
}
