//! Client surface of the raster crop service.
//!
//! This crate wires the job store, object storage and worker pool together:
//! - `JobSubmitter` validates and enqueues crop requests
//! - `StatusTracker` answers status, result and delete calls
//! - `CropService` starts everything and exposes both

mod config;
mod error;
mod service;
mod submitter;
mod tracker;

pub use config::{DEFAULT_CONCURRENCY, DEFAULT_OUTPUT_BUCKET, DEFAULT_OUTPUT_DOMAIN, ServiceConfig};
pub use error::ServiceError;
pub use service::CropService;
pub use submitter::JobSubmitter;
pub use tracker::StatusTracker;

// Re-export core types for convenience
pub use crop_core::{
    BoundingBox, CropRequest, Job, JobEvent, JobId, JobStatus, ObjectLocation, ResultLocation,
    ServiceResource, StatusKind, StatusUpdate,
};
