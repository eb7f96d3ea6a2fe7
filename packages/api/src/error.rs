use actors::PipelineError;
use crop_core::{JobId, StatusKind, ValidationError};
use db::DbError;
use storage::StorageError;
use thiserror::Error;

/// Errors returned to callers of the crop service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was rejected before any job was created.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("job not found: {0}")]
    NotFound(String),

    /// The job exists but has not finished yet.
    #[error("job {job_id} is {status}, no result yet")]
    ResultNotReady { job_id: JobId, status: StatusKind },

    /// The job finished without a result.
    #[error("job {job_id} failed: {error}")]
    JobFailed { job_id: JobId, error: String },

    #[error("job store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("worker pool unavailable: {0}")]
    Dispatch(String),

    #[error("job store error: {0}")]
    Store(DbError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("crop failed: {0}")]
    Crop(#[from] PipelineError),

    #[error("invalid service config: {0}")]
    InvalidConfig(String),
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => ServiceError::NotFound(what),
            DbError::Unavailable(reason) => ServiceError::StoreUnavailable(reason),
            other if other.is_transient() => ServiceError::StoreUnavailable(other.to_string()),
            other => ServiceError::Store(other),
        }
    }
}
