//! The resume ingestion pipeline: coordinator, status tracking, persistence
//! and the storage seams they run against.

pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod persistence;
pub mod retry;
pub mod status;
pub mod store;
