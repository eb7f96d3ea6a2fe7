//! Accepting crop requests.

use std::sync::Arc;

use actors::{ActorRef, DispatcherMessage};
use chrono::Utc;
use crop_core::{CropRequest, Job, JobEvent, JobId};
use db::JobStore;
use tokio::sync::broadcast;

use crate::ServiceError;

/// Validates requests, records them as PENDING jobs, and queues them.
#[derive(Clone)]
pub struct JobSubmitter {
    store: Arc<dyn JobStore>,
    dispatcher: ActorRef<DispatcherMessage>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl JobSubmitter {
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

    /// Submit a request and return the new job's id without waiting for it
    /// to run. Invalid requests are rejected before anything is recorded.
    pub async fn submit(&self, request: CropRequest) -> Result<JobId, ServiceError> {
        request.validate()?;

        let job = Job::new(request);
        let job_id = job.id;
        self.store.put(&job).await?;

        if let Err(e) = self.dispatcher.send_message(DispatcherMessage::Dispatch {
            job: Box::new(job.clone()),
        }) {
            tracing::error!(job_id = %job_id, error = %e, "Failed to queue job");
            let mut failed = job;
            if failed.fail(format!("dispatch: {e}")).is_ok()
                && let Err(e) = self.store.put(&failed).await
            {
                tracing::error!(job_id = %job_id, error = %e, "Failed to record dispatch failure");
            }
            return Err(ServiceError::Dispatch(e.to_string()));
        }

        tracing::info!(job_id = %job_id, source = %job.request.source, "Job submitted");
        let _ = self.event_tx.send(JobEvent::JobSubmitted {
            job_id,
            timestamp: Utc::now(),
        });

        Ok(job_id)
    }

    /// Parse a JSON submission payload and submit it.
    pub async fn submit_json(&self, payload: &str) -> Result<JobId, ServiceError> {
        self.submit(CropRequest::from_json(payload)?).await
    }
}
