//! Event types for job lifecycle notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Events emitted by the crop service as jobs move through their lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was accepted and recorded as pending.
    JobSubmitted {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A worker started executing the job.
    JobStarted {
        job_id: JobId,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// The job published its result.
    JobSucceeded {
        job_id: JobId,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// The job failed.
    JobFailed {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A running job stopped early after its record was deleted.
    JobCancelled {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A job record was deleted by a client.
    JobDeleted {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the job ID this event is about.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobSubmitted { job_id, .. } => *job_id,
            JobEvent::JobStarted { job_id, .. } => *job_id,
            JobEvent::JobSucceeded { job_id, .. } => *job_id,
            JobEvent::JobFailed { job_id, .. } => *job_id,
            JobEvent::JobCancelled { job_id, .. } => *job_id,
            JobEvent::JobDeleted { job_id, .. } => *job_id,
        }
    }

    /// Check if the event marks the end of a pipeline execution.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            JobEvent::JobSucceeded { .. } | JobEvent::JobFailed { .. } | JobEvent::JobCancelled { .. }
        )
    }
}
