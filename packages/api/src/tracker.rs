//! Polling and deleting jobs.

use std::sync::Arc;
use std::time::Duration;

use actors::{ActorRef, CancelOutcome, DispatcherMessage};
use chrono::Utc;
use crop_core::{Job, JobEvent, JobId, JobStatus, ResultLocation, ServiceResource, StatusKind, StatusUpdate};
use db::JobStore;
use ractor::rpc::CallResult;
use tokio::sync::broadcast;

use crate::ServiceError;

const CANCEL_TIMEOUT: Duration = Duration::from_secs(5);

/// Read and delete surface over the job store.
///
/// Ids are taken as strings the way clients send them; an id that does not
/// parse cannot name a job and is treated as unknown.
#[derive(Clone)]
pub struct StatusTracker {
    store: Arc<dyn JobStore>,
    dispatcher: ActorRef<DispatcherMessage>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl StatusTracker {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: ActorRef<DispatcherMessage>,
        event_tx: broadcast::Sender<JobEvent>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            event_tx,
        }
    }

    async fn load(&self, id: &str) -> Result<Job, ServiceError> {
        let job_id = parse_id(id)?;
        Ok(self.store.get(job_id).await?)
    }

    /// Status and progress of a job.
    pub async fn status(&self, id: &str) -> Result<StatusUpdate, ServiceError> {
        Ok(StatusUpdate::from(&self.load(id).await?))
    }

    /// The published result of a successful job.
    pub async fn result(&self, id: &str) -> Result<ResultLocation, ServiceError> {
        let job = self.load(id).await?;
        match job.status {
            JobStatus::Success { result, .. } => Ok(result),
            JobStatus::Failed { error, .. } => Err(ServiceError::JobFailed {
                job_id: job.id,
                error,
            }),
            ref pending => Err(ServiceError::ResultNotReady {
                job_id: job.id,
                status: StatusKind::from(pending),
            }),
        }
    }

    /// The full client view of a job.
    pub async fn job(&self, id: &str) -> Result<ServiceResource, ServiceError> {
        Ok(ServiceResource::from(&self.load(id).await?))
    }

    /// Stop a job and delete its record.
    ///
    /// The worker pool is told first, so a queued job is dropped before a
    /// worker can pick it up; a running one removes anything it writes back.
    /// Deleting an unknown id succeeds. Once this returns, status queries
    /// report `NotFound`.
    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let Ok(job_id) = parse_id(id) else {
            tracing::debug!(id, "Ignoring delete of malformed id");
            return Ok(());
        };

        let result = ractor::rpc::call(
            &self.dispatcher,
            |reply| DispatcherMessage::Cancel { job_id, reply },
            Some(CANCEL_TIMEOUT),
        )
        .await;
        match result {
            Ok(CallResult::Success(outcome)) => {
                if outcome != CancelOutcome::Unknown {
                    tracing::info!(job_id = %job_id, ?outcome, "Cancelled job before delete");
                }
            }
            // A run that is not told will write its terminal state back.
            _ => tracing::warn!(job_id = %job_id, "Could not reach dispatcher to cancel job"),
        }

        self.store.delete(job_id).await?;
        tracing::info!(job_id = %job_id, "Job deleted");
        let _ = self.event_tx.send(JobEvent::JobDeleted {
            job_id,
            timestamp: Utc::now(),
        });

        Ok(())
    }
}

fn parse_id(id: &str) -> Result<JobId, ServiceError> {
    JobId::parse(id.trim()).map_err(|_| ServiceError::NotFound(format!("Job not found: {}", id)))
}
