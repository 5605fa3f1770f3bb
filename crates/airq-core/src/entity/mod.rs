pub mod alerts;
pub mod measurements;
