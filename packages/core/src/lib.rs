//! Core domain types for the raster crop service.
//!
//! This crate contains shared types used across all packages:
//! - CropRequest and its parts for submissions
//! - Job and JobStatus for tracked executions
//! - ServiceResource and StatusUpdate for the client read surface
//! - Events for lifecycle notifications

mod events;
mod job;
mod request;
mod view;

pub use events::JobEvent;
pub use job::{GEOTIFF_MIME_TYPE, Job, JobId, JobStatus, ResultLocation, TransitionError};
pub use request::{BoundingBox, CropRequest, ObjectLocation, ValidationError};
pub use view::{ServiceResource, StatusKind, StatusUpdate};
