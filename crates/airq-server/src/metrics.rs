use metrics::{counter, describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// 初始化 Prometheus metrics exporter
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    describe_metrics();

    tracing::info!("Metrics exporter started on http://{}/metrics", addr);
    Ok(())
}

/// 描述所有指标
fn describe_metrics() {
    // 接入
    describe_counter!(
        "airq_ingest_requests_total",
        "Total number of ingest requests by result"
    );

    // 读数消费
    describe_counter!(
        "airq_measurements_received_total",
        "Total number of measurement messages received"
    );
    describe_counter!(
        "airq_measurements_malformed_total",
        "Total number of measurement messages skipped as malformed"
    );
    describe_counter!(
        "airq_anomalies_detected_total",
        "Total number of anomalies detected by reason"
    );
    describe_counter!(
        "airq_persistence_failures_total",
        "Total number of record store write failures by kind"
    );

    // 告警
    describe_counter!("airq_alerts_published_total", "Total number of alerts published");
    describe_counter!(
        "airq_alert_publish_failures_total",
        "Total number of alert publish failures"
    );
    describe_counter!(
        "airq_alerts_broadcast_total",
        "Total number of alerts pushed to subscribers"
    );

    // 订阅者
    describe_counter!(
        "airq_subscribers_dropped_total",
        "Subscribers dropped after a failed write"
    );
    describe_gauge!("airq_subscribers", "Number of live subscribers");
}

/// 记录接入请求
pub fn record_ingest(result: &'static str) {
    counter!("airq_ingest_requests_total", 1, "result" => result);
}
