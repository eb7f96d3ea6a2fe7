//! Pipeline failure taxonomy.

use std::path::PathBuf;

use thiserror::Error;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Transform,
    Serialize,
    Publish,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Transform => "transform",
            Stage::Serialize => "serialize",
            Stage::Publish => "publish",
        }
    }

    /// Progress reported once this stage has completed.
    pub fn progress(self) -> u8 {
        match self {
            Stage::Fetch => 25,
            Stage::Transform => 50,
            Stage::Serialize => 75,
            Stage::Publish => 99,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a pipeline run did not produce a result.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage failed; the message is recorded on the job.
    #[error("{stage}: {message}")]
    Stage { stage: Stage, message: String },

    #[error("workspace: {0}")]
    Workspace(#[from] std::io::Error),

    /// The job was deleted while it ran.
    #[error("cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn stage(stage: Stage, err: impl std::fmt::Display) -> Self {
        PipelineError::Stage {
            stage,
            message: err.to_string(),
        }
    }
}

/// Best-effort release of a job's local resources failed.
#[derive(Debug, Error)]
#[error("failed to remove workspace {path}: {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
