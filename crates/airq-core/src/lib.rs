pub mod entity;
pub mod error;
pub mod geo;
pub mod memory;
pub mod record;
pub mod store;

pub use error::{AirqError, Result};
pub use memory::MemoryRecordStore;
pub use record::{RecordStore, SharedRecordStore};
pub use store::SeaOrmRecordStore;
