//! Job domain types for tracked crop executions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::{CropRequest, ObjectLocation};

/// MIME type of every published crop result.
pub const GEOTIFF_MIME_TYPE: &str = "image/tiff";

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location and type of a published crop result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultLocation {
    pub location: ObjectLocation,
    pub mime_type: String,
}

impl ResultLocation {
    /// A GeoTIFF published at the given location.
    pub fn geotiff(location: ObjectLocation) -> Self {
        Self {
            location,
            mime_type: GEOTIFF_MIME_TYPE.to_string(),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.location.bucket_name
    }

    pub fn file_name(&self) -> &str {
        &self.location.file_name
    }

    pub fn domain(&self) -> &str {
        &self.location.domain
    }
}

/// Current status of a job in its lifecycle.
///
/// The result and the error message live inside the variant they belong to, so
/// a record can never carry a result without being successful or an error
/// without having failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting for a worker.
    #[default]
    Pending,
    /// Job is being executed by a worker.
    Running { started_at: DateTime<Utc> },
    /// Job published its result.
    Success {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        result: ResultLocation,
    },
    /// Job failed with an error.
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        started_at: Option<DateTime<Utc>>,
        failed_at: DateTime<Utc>,
        error: String,
    },
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success { .. } | JobStatus::Failed { .. })
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running { .. } => "running",
            JobStatus::Success { .. } => "success",
            JobStatus::Failed { .. } => "failed",
        }
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job {job_id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: &'static str,
    pub to: &'static str,
}

/// A tracked crop execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Current status.
    pub status: JobStatus,
    /// Completion percentage, 0..=100.
    #[serde(default)]
    pub progress: u8,
    /// The request this job executes.
    pub request: CropRequest,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job with a fresh id.
    pub fn new(request: CropRequest) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            progress: 0,
            request,
            created_at: now,
            updated_at: now,
        }
    }

    /// The published result, present only on success.
    pub fn result(&self) -> Option<&ResultLocation> {
        match &self.status {
            JobStatus::Success { result, .. } => Some(result),
            _ => None,
        }
    }

    /// The failure summary, present only on failure.
    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// PENDING -> RUNNING.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.status, JobStatus::Pending) {
            return Err(self.rejected("running"));
        }
        let now = Utc::now();
        self.status = JobStatus::Running { started_at: now };
        self.progress = 0;
        self.updated_at = now;
        Ok(())
    }

    /// RUNNING -> SUCCESS.
    pub fn succeed(&mut self, result: ResultLocation) -> Result<(), TransitionError> {
        let JobStatus::Running { started_at } = self.status else {
            return Err(self.rejected("success"));
        };
        let now = Utc::now();
        self.status = JobStatus::Success {
            started_at,
            completed_at: now,
            result,
        };
        self.progress = 100;
        self.updated_at = now;
        Ok(())
    }

    /// PENDING or RUNNING -> FAILED. `progress` keeps the last reached value.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        let started_at = match self.status {
            JobStatus::Pending => None,
            JobStatus::Running { started_at } => Some(started_at),
            _ => return Err(self.rejected("failed")),
        };
        let now = Utc::now();
        self.status = JobStatus::Failed {
            started_at,
            failed_at: now,
            error: error.into(),
        };
        self.updated_at = now;
        Ok(())
    }

    /// Record stage progress on a running job without changing its status.
    pub fn advance(&mut self, progress: u8) {
        if matches!(self.status, JobStatus::Running { .. }) {
            self.progress = progress.min(99);
        }
    }

    fn rejected(&self, to: &'static str) -> TransitionError {
        TransitionError {
            job_id: self.id,
            from: self.status.as_str(),
            to,
        }
    }
}
