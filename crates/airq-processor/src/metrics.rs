use airq_types::AnomalyReason;
use metrics::counter;

pub fn record_received() {
    counter!("airq_measurements_received_total", 1);
}

pub fn record_malformed() {
    counter!("airq_measurements_malformed_total", 1);
}

pub fn record_anomaly(reason: AnomalyReason) {
    counter!("airq_anomalies_detected_total", 1, "reason" => reason.as_str());
}

pub fn record_alert_published() {
    counter!("airq_alerts_published_total", 1);
}

pub fn record_publish_failure() {
    counter!("airq_alert_publish_failures_total", 1);
}

pub fn record_persistence_failure(kind: &'static str) {
    counter!("airq_persistence_failures_total", 1, "kind" => kind);
}
