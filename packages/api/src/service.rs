//! Service startup and the top-level client surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actors::{ActorRef, Destination, DispatcherMessage, Pipeline, PipelineContext, start_dispatcher};
use crop_core::{CropRequest, JobEvent, JobId, ResultLocation, ServiceResource, StatusUpdate};
use db::{DbConfig, JobStore, RetryingJobStore};
use ractor::rpc::CallResult;
use raster::{GeoTiffCodec, GridCropEngine};
use storage::{ObjectTransfer, Storage};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::{JobSubmitter, ServiceConfig, ServiceError, StatusTracker};

const EVENT_CAPACITY: usize = 256;

/// A running crop service: the worker pool plus the submit and poll surfaces.
pub struct CropService {
    submitter: JobSubmitter,
    tracker: StatusTracker,
    pipeline: Arc<Pipeline>,
    dispatcher: ActorRef<DispatcherMessage>,
    handle: JoinHandle<()>,
    event_tx: broadcast::Sender<JobEvent>,
}

impl CropService {
    /// Start the worker pool over `store` and `objects`.
    ///
    /// Store reads get one retry after `config.store_retry_delay`.
    pub async fn start<S: JobStore>(
        config: ServiceConfig,
        store: S,
        objects: Arc<dyn ObjectTransfer>,
    ) -> Result<Self, ServiceError> {
        tracing::info!(
            workspace_root = %config.workspace_root.display(),
            output_bucket = %config.output_bucket,
            concurrency = config.concurrency,
            "Starting crop service"
        );

        let store: Arc<dyn JobStore> =
            Arc::new(RetryingJobStore::new(store).with_delay(config.store_retry_delay));
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let pipeline = Arc::new(Pipeline::new(PipelineContext {
            store: store.clone(),
            objects,
            engine: Arc::new(GridCropEngine),
            codec: Arc::new(GeoTiffCodec),
            workspace_root: config.workspace_root.clone(),
            destination: Destination::new(config.output_domain, config.output_bucket),
            event_tx: event_tx.clone(),
        }));

        let (dispatcher, handle) = start_dispatcher(pipeline.clone(), config.concurrency)
            .await
            .map_err(|e| ServiceError::Dispatch(e.to_string()))?;

        Ok(Self {
            submitter: JobSubmitter::new(store.clone(), dispatcher.clone(), event_tx.clone()),
            tracker: StatusTracker::new(store, dispatcher.clone(), event_tx.clone()),
            pipeline,
            dispatcher,
            handle,
            event_tx,
        })
    }

    /// Start from environment variables: `SURREAL_*` for the job store,
    /// `STORAGE_*`/`S3_*` for object storage, and the [`ServiceConfig`] set.
    pub async fn from_env() -> Result<Self, ServiceError> {
        let config = ServiceConfig::from_env()?;
        let store = db::open(&DbConfig::from_env()?).await?;
        let objects = Storage::from_env().await?;
        Self::start(config, store, Arc::new(objects)).await
    }

    pub fn submitter(&self) -> &JobSubmitter {
        &self.submitter
    }

    pub fn tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    pub async fn submit(&self, request: CropRequest) -> Result<JobId, ServiceError> {
        self.submitter.submit(request).await
    }

    pub async fn submit_json(&self, payload: &str) -> Result<JobId, ServiceError> {
        self.submitter.submit_json(payload).await
    }

    pub async fn status(&self, id: &str) -> Result<StatusUpdate, ServiceError> {
        self.tracker.status(id).await
    }

    pub async fn result(&self, id: &str) -> Result<ResultLocation, ServiceError> {
        self.tracker.result(id).await
    }

    pub async fn job(&self, id: &str) -> Result<ServiceResource, ServiceError> {
        self.tracker.job(id).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.tracker.delete(id).await
    }

    /// Crop synchronously and return the published location. No job record
    /// is created.
    pub async fn crop_now(&self, request: &CropRequest) -> Result<ResultLocation, ServiceError> {
        request.validate()?;
        Ok(self.pipeline.crop_now(request).await?)
    }

    /// Lifecycle events of every job from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub fn workspace_root(&self) -> PathBuf {
        self.pipeline.context().workspace_root.clone()
    }

    /// Queue depth and in-flight count.
    pub async fn stats(&self) -> Result<actors::DispatcherStats, ServiceError> {
        let result = ractor::rpc::call(
            &self.dispatcher,
            |reply| DispatcherMessage::GetStats { reply },
            Some(Duration::from_secs(5)),
        )
        .await;
        match result {
            Ok(CallResult::Success(stats)) => Ok(stats),
            Ok(_) => Err(ServiceError::Dispatch("dispatcher did not answer".into())),
            Err(e) => Err(ServiceError::Dispatch(e.to_string())),
        }
    }

    /// Stop the worker pool. Running jobs finish first; queued ones stay
    /// PENDING in the store.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down crop service");
        if let Err(e) = self.dispatcher.send_message(DispatcherMessage::Shutdown) {
            tracing::warn!(error = %e, "Dispatcher already stopped");
        }
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Dispatcher task ended abnormally");
        }
    }
}
