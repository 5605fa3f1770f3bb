use metrics::{counter, gauge};

pub fn set_subscribers(count: usize) {
    gauge!("airq_subscribers", count as f64);
}

pub fn record_broadcast() {
    counter!("airq_alerts_broadcast_total", 1);
}

pub fn record_dropped(count: usize) {
    counter!("airq_subscribers_dropped_total", count as u64);
}

pub fn record_persistence_failure() {
    counter!("airq_persistence_failures_total", 1, "kind" => "alert");
}
