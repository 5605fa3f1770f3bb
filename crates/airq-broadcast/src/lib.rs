pub mod alert_consumer;
pub mod error;
mod metrics;
pub mod registry;
pub mod sink;
pub mod ws;

pub use alert_consumer::{AlertConsumer, AlertConsumerStats};
pub use error::BroadcastError;
pub use registry::{BroadcastReport, Registration, SubscriberRegistry, DEFAULT_SNAPSHOT_WINDOW_SECS};
pub use sink::SubscriberSink;
pub use ws::{serve_socket, SubscriberHub};
