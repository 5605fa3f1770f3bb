pub mod consumer;
pub mod error;
mod metrics;
pub mod publisher;

pub use consumer::{ConsumerState, ConsumerStats, MeasurementConsumer, Outcome};
pub use error::{ProcessorError, Result};
pub use publisher::AlertPublisher;
