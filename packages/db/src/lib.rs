//! Job persistence for the raster crop service.
//!
//! The `JobStore` trait is the only persistence seam the rest of the service
//! sees. This crate provides:
//!
//! - `JobRepository`: SurrealDB-backed store
//! - `MemoryJobStore`: process-local store
//! - `RetryingJobStore`: wrapper giving reads one retry on transient failure
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod schema;
mod store;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError, connect};
pub use schema::{JOB_TABLE, init_schema};
pub use store::{DEFAULT_RETRY_DELAY, JobStore, MemoryJobStore, RetryingJobStore};

/// Connect with the given configuration and return a ready job repository.
pub async fn open(config: &DbConfig) -> Result<repositories::JobRepository, DbError> {
    let db = connect(config).await?;
    Ok(repositories::JobRepository::new(db))
}
