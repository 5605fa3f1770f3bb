use airq_queue::AckMode;
use airq_server::config::{AppConfig, CacheBackend, LogFormat, QueueBackend};
use std::collections::HashMap;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_empty_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "").unwrap();

    let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.queue.measurement_queue, "measurements");
    assert_eq!(config.queue.alert_queue, "anomaly_alerts");
    assert_eq!(config.queue.ack_mode, AckMode::Auto);
    assert_eq!(config.queue.prefetch, 32);
    assert_eq!(config.alerts.snapshot_window_secs, 7200);
    assert_eq!(config.logging.format, LogFormat::Pretty);
    assert!(!config.metrics.enabled);
}

#[test]
fn test_missing_file_is_not_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent");

    let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn test_file_values_override_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[server]
port = 9090

[queue]
backend = "memory"
ack_mode = "manual"
prefetch = 8

[cache]
backend = "redis"
key_prefix = "test:window"

[alerts]
snapshot_window_secs = 600

[logging]
level = "debug"
format = "json"
"#,
    )
    .unwrap();

    let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();

    assert_eq!(config.server.port, 9090);
    assert_eq!(config.queue.backend, QueueBackend::Memory);
    assert_eq!(config.queue.ack_mode, AckMode::Manual);
    assert_eq!(config.queue.prefetch, 8);
    assert_eq!(config.cache.backend, CacheBackend::Redis);
    assert_eq!(config.cache.key_prefix, "test:window");
    assert_eq!(config.alerts.snapshot_window_secs, 600);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_deployment_variables_override_urls() {
    let env: HashMap<&str, &str> = [
        ("RABBITMQ_URL", "amqp://rabbit:5672/%2f"),
        ("DATABASE_URL", "postgres://airq@db/airq"),
        ("REDIS_URL", "redis://cache:6379/"),
    ]
    .into_iter()
    .collect();

    let mut config = AppConfig::default();
    assert_eq!(config.cache.backend, CacheBackend::Memory);

    config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.queue.url, "amqp://rabbit:5672/%2f");
    assert_eq!(config.database.url, "postgres://airq@db/airq");
    assert_eq!(config.cache.url, "redis://cache:6379/");
    assert_eq!(config.cache.backend, CacheBackend::Redis);
}

#[test]
fn test_blank_deployment_variables_are_ignored() {
    let mut config = AppConfig::default();
    config.apply_env_overrides(|key| (key == "REDIS_URL").then(|| "  ".to_string()));

    assert_eq!(config.cache.backend, CacheBackend::Memory);
    assert_eq!(config.cache.url, "redis://127.0.0.1:6379/");
}
