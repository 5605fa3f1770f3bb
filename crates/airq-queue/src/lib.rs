pub mod broker;
pub mod delivery;
pub mod error;
pub mod memory;
#[cfg(feature = "amqp")]
pub mod amqp;

pub use broker::{AckMode, Broker, QueueConsumer, QueueOptions, QueuePublisher, SharedBroker};
pub use delivery::{Acker, Delivery};
pub use error::{QueueError, Result};
pub use memory::MemoryBroker;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;

/// 读数队列默认名称
pub const MEASUREMENT_QUEUE: &str = "measurements";

/// 告警队列默认名称
pub const ALERT_QUEUE: &str = "anomaly_alerts";

/// 死信队列名称
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}.dead", queue)
}
