//! Message types for actor communication.

use crop_core::{Job, JobId};
use ractor::RpcReplyPort;
use tokio_util::sync::CancellationToken;

/// A job handed to a worker with the token that cancels it.
#[derive(Debug)]
pub struct Assignment {
    pub job: Job,
    pub cancel: CancellationToken,
}

/// Queue and in-flight counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub pending: usize,
    pub running: usize,
    pub workers: usize,
}

/// What a cancel request found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Removed from the queue before any worker saw it.
    Dequeued,
    /// A worker is running it; its token has been cancelled.
    Signalled,
    /// Not queued or running here.
    Unknown,
}

/// Messages for the Dispatcher.
#[derive(Debug)]
pub enum DispatcherMessage {
    /// Queue a freshly recorded PENDING job.
    Dispatch { job: Box<Job> },

    /// Request the next job for a worker.
    RequestJob {
        worker_id: String,
        reply: RpcReplyPort<Option<Assignment>>,
    },

    /// Report that a worker is done with a job, whatever the outcome.
    JobFinished { job_id: JobId, worker_id: String },

    /// Drop a queued job or signal a running one.
    Cancel {
        job_id: JobId,
        reply: RpcReplyPort<CancelOutcome>,
    },

    /// Get queue stats.
    GetStats { reply: RpcReplyPort<DispatcherStats> },

    /// Drop queued jobs and stop the workers once their current run ends.
    Shutdown,
}

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Run a job through the pipeline.
    ProcessJob { assignment: Box<Assignment> },

    /// Heartbeat tick.
    Heartbeat,
}
