//! Execution of a single crop job: fetch, crop, serialize, publish.
//!
//! A run owns its job id end to end. It writes RUNNING, does all work inside
//! a private [`Workspace`], releases every raster handle before that
//! workspace is deleted, and finishes with exactly one terminal write. Stage
//! failures become a FAILED record; they never escape the run.
//!
//! Deleting a job cancels its token. The run notices at the next checkpoint
//! (right after the RUNNING write, after fetch, after transform, before
//! publish, before the terminal write), cleans up, writes nothing more and
//! removes any record it wrote back, so the deleted record stays deleted. A
//! delete landing after the last checkpoint can still be overwritten by the
//! terminal write; the job then ends in that terminal state.
//!
//! The source object is fetched into `source/` and the encoded crop is
//! written under `output/`, so no object key can collide with the output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use crop_core::{CropRequest, Job, JobEvent, JobId, ObjectLocation, ResultLocation};
use db::JobStore;
use raster::{Coverage, CropEngine, Envelope, RasterCodec, RasterError};
use storage::ObjectTransfer;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{PipelineError, Stage, Workspace};

/// Where published crops go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub domain: String,
    pub bucket: String,
}

impl Destination {
    pub fn new(domain: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            bucket: bucket.into(),
        }
    }
}

/// Collaborators shared by every run.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn JobStore>,
    pub objects: Arc<dyn ObjectTransfer>,
    pub engine: Arc<dyn CropEngine>,
    pub codec: Arc<dyn RasterCodec>,
    /// Parent directory of all job workspaces.
    pub workspace_root: PathBuf,
    pub destination: Destination,
    pub event_tx: broadcast::Sender<JobEvent>,
}

/// How a run ended, from the worker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// SUCCESS was written.
    Succeeded,
    /// FAILED was written.
    Failed,
    /// The job was deleted; nothing was written after that.
    Cancelled,
    /// The job store rejected a write, so the record may be stale.
    Aborted,
}

pub struct Pipeline {
    ctx: PipelineContext,
}

impl Pipeline {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Drive `job` from PENDING to a terminal state.
    pub async fn run(&self, mut job: Job, worker_id: &str, cancel: &CancellationToken) -> RunOutcome {
        let job_id = job.id;

        if cancel.is_cancelled() {
            return self.cancelled(job_id).await;
        }
        if let Err(e) = job.start() {
            tracing::warn!(job_id = %job_id, error = %e, "Skipping job");
            return RunOutcome::Aborted;
        }
        if let Err(e) = self.ctx.store.put(&job).await {
            tracing::error!(job_id = %job_id, error = %e, "Failed to mark job running");
            self.record_failure(&mut job, format!("store: {e}")).await;
            return RunOutcome::Aborted;
        }
        // A delete that landed while RUNNING was being written.
        if cancel.is_cancelled() {
            return self.cancelled(job_id).await;
        }

        tracing::info!(job_id = %job_id, worker_id, source = %job.request.source, "Job started");
        self.emit(JobEvent::JobStarted {
            job_id,
            worker_id: worker_id.to_string(),
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let mut reached = None;
        let result = match Workspace::acquire(&self.ctx.workspace_root, job_id).await {
            Ok(workspace) => {
                let result = self
                    .stages(&job.request, &workspace, cancel, &mut reached)
                    .await;
                if let Err(e) = workspace.release().await {
                    tracing::warn!(job_id = %job_id, error = %e, "Workspace cleanup failed");
                }
                result
            }
            Err(e) => Err(PipelineError::Workspace(e)),
        };

        if cancel.is_cancelled() || matches!(result, Err(PipelineError::Cancelled)) {
            return self.cancelled(job_id).await;
        }
        if let Some(stage) = reached {
            job.advance(stage.progress());
        }

        match result {
            Ok(location) => {
                if let Err(e) = job.succeed(location) {
                    tracing::error!(job_id = %job_id, error = %e, "Cannot record success");
                    return RunOutcome::Aborted;
                }
                if let Err(e) = self.ctx.store.put(&job).await {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to record job success");
                    return RunOutcome::Aborted;
                }

                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::info!(job_id = %job_id, duration_ms, "Job succeeded");
                self.emit(JobEvent::JobSucceeded {
                    job_id,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                RunOutcome::Succeeded
            }
            Err(e) => {
                let error = e.to_string();
                tracing::warn!(job_id = %job_id, error = %error, "Job failed");
                if !self.record_failure(&mut job, error.clone()).await {
                    return RunOutcome::Aborted;
                }
                self.emit(JobEvent::JobFailed {
                    job_id,
                    error,
                    timestamp: Utc::now(),
                });
                RunOutcome::Failed
            }
        }
    }

    /// Crop `request` right away, without a job record.
    pub async fn crop_now(&self, request: &CropRequest) -> Result<ResultLocation, PipelineError> {
        let workspace = Workspace::acquire(&self.ctx.workspace_root, JobId::new()).await?;
        let result = self
            .stages(request, &workspace, &CancellationToken::new(), &mut None)
            .await;
        if let Err(e) = workspace.release().await {
            tracing::warn!(error = %e, "Workspace cleanup failed");
        }
        result
    }

    async fn stages(
        &self,
        request: &CropRequest,
        workspace: &Workspace,
        cancel: &CancellationToken,
        reached: &mut Option<Stage>,
    ) -> Result<ResultLocation, PipelineError> {
        let source_dir = workspace.file("source");
        tokio::fs::create_dir_all(&source_dir)
            .await
            .map_err(|e| PipelineError::stage(Stage::Fetch, e))?;
        let source = self
            .ctx
            .objects
            .fetch(&request.source, &source_dir)
            .await
            .map_err(|e| PipelineError::stage(Stage::Fetch, e))?;
        *reached = Some(Stage::Fetch);
        checkpoint(cancel)?;

        let cropped = self.crop(source, Envelope::from(&request.bounds)).await?;
        *reached = Some(Stage::Transform);
        if let Err(e) = checkpoint(cancel) {
            cropped.dispose();
            return Err(e);
        }

        let output = self.serialize(cropped, workspace, &request.source.file_name).await?;
        *reached = Some(Stage::Serialize);
        checkpoint(cancel)?;

        let bucket = &self.ctx.destination.bucket;
        let key = self
            .ctx
            .objects
            .publish(&output, bucket)
            .await
            .map_err(|e| PipelineError::stage(Stage::Publish, e))?;
        *reached = Some(Stage::Publish);

        Ok(ResultLocation {
            location: ObjectLocation::new(self.ctx.destination.domain.clone(), bucket.clone(), key),
            mime_type: self.ctx.codec.mime_type().to_string(),
        })
    }

    /// Decode the source and crop it. The source handle and the full
    /// coverage are disposed before returning.
    async fn crop(&self, source: PathBuf, envelope: Envelope) -> Result<Coverage, PipelineError> {
        let codec = Arc::clone(&self.ctx.codec);
        let engine = Arc::clone(&self.ctx.engine);

        tokio::task::spawn_blocking(move || -> Result<Coverage, RasterError> {
            let mut handle = codec.open(&source)?;
            let cropped = handle.read().and_then(|coverage| {
                let cropped = engine.crop(&coverage, &envelope);
                coverage.dispose();
                cropped
            });
            handle.dispose();
            cropped
        })
        .await
        .map_err(|e| PipelineError::stage(Stage::Transform, e))?
        .map_err(|e| PipelineError::stage(Stage::Transform, e))
    }

    /// Encode `coverage` into the workspace's output directory and dispose it.
    async fn serialize(
        &self,
        coverage: Coverage,
        workspace: &Workspace,
        source_name: &str,
    ) -> Result<PathBuf, PipelineError> {
        let codec = Arc::clone(&self.ctx.codec);
        let output_dir = workspace.file("output");
        let output = output_dir.join(format!("{}.{}", file_stem(source_name), codec.extension()));

        let path = output.clone();
        tokio::task::spawn_blocking(move || -> Result<(), RasterError> {
            let written = std::fs::create_dir_all(&output_dir)
                .map_err(RasterError::from)
                .and_then(|()| codec.write(&coverage, &path));
            coverage.dispose();
            written
        })
        .await
        .map_err(|e| PipelineError::stage(Stage::Serialize, e))?
        .map_err(|e| PipelineError::stage(Stage::Serialize, e))?;

        Ok(output)
    }

    /// Write FAILED for `job`. Returns whether the write landed.
    async fn record_failure(&self, job: &mut Job, error: String) -> bool {
        if let Err(e) = job.fail(error) {
            tracing::error!(job_id = %job.id, error = %e, "Cannot record failure");
            return false;
        }
        match self.ctx.store.put(job).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
                false
            }
        }
    }

    /// Give up on a deleted job. Any record still present was written back by
    /// this run after the client's delete, so it is removed again.
    async fn cancelled(&self, job_id: JobId) -> RunOutcome {
        if let Err(e) = self.ctx.store.delete(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to remove record of deleted job");
        }
        tracing::info!(job_id = %job_id, "Job cancelled after delete");
        self.emit(JobEvent::JobCancelled {
            job_id,
            timestamp: Utc::now(),
        });
        RunOutcome::Cancelled
    }

    fn emit(&self, event: JobEvent) {
        // No receivers is fine.
        let _ = self.ctx.event_tx.send(event);
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

fn file_stem(object_key: &str) -> &str {
    Path::new(object_key)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("raster")
}
