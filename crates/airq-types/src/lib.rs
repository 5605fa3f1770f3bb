pub mod aggregate;
pub mod alert;
pub mod measurement;

pub use aggregate::{Sample, WindowAggregate};
pub use alert::{AlertRecord, AnomalyReason};
pub use measurement::{Measurement, MeasurementPayload, ValidationError};
