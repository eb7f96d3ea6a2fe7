//! Job execution for the crop service.
//!
//! This crate provides the crop pipeline and the Ractor-based worker pool
//! that runs it.
//!
//! # Architecture
//!
//! - `Pipeline` - Runs one job: fetch, crop, serialize, publish, terminal write
//! - `Dispatcher` - Owns the pending queue and the in-flight cancellation tokens
//! - `WorkerActor` - Pulls jobs from the dispatcher and runs them one at a time
//!
//! # Usage
//!
//! ```ignore
//! use actors::{DispatcherMessage, Pipeline, start_dispatcher};
//!
//! let pipeline = Arc::new(Pipeline::new(context));
//! let (dispatcher, handle) = start_dispatcher(pipeline, 4).await?;
//!
//! dispatcher.send_message(DispatcherMessage::Dispatch { job: Box::new(job) })?;
//! ```

mod dispatcher;
mod error;
mod messages;
mod pipeline;
mod worker_actor;
mod workspace;

pub use dispatcher::{Dispatcher, DispatcherArgs, start_dispatcher};
pub use error::{CleanupError, PipelineError, Stage};
pub use messages::{Assignment, CancelOutcome, DispatcherMessage, DispatcherStats, WorkerMessage};
pub use pipeline::{Destination, Pipeline, PipelineContext, RunOutcome};
pub use worker_actor::WorkerActor;
pub use workspace::Workspace;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
