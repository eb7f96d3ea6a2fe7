//! Worker actor for executing crop jobs.

use std::sync::Arc;
use std::time::Duration;

use crop_core::JobId;
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::messages::{DispatcherMessage, WorkerMessage};
use crate::pipeline::Pipeline;

/// How often an idle worker asks for work.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID.
    pub worker_id: String,
    /// Job currently assigned, from the moment it is handed over until the
    /// run finishes.
    pub current_job: Option<JobId>,
    /// Dispatcher actor reference.
    pub dispatcher: ActorRef<DispatcherMessage>,
    pub pipeline: Arc<Pipeline>,
}

impl WorkerActorState {
    /// Check if the worker is idle.
    pub fn is_idle(&self) -> bool {
        self.current_job.is_none()
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub dispatcher: ActorRef<DispatcherMessage>,
    pub pipeline: Arc<Pipeline>,
}

/// Worker actor that runs one pipeline at a time.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {}", args.worker_id);

        // Start the work loop
        let myself_clone = myself.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(POLL_INTERVAL).await;
                if myself_clone.send_message(WorkerMessage::Heartbeat).is_err() {
                    break;
                }
            }
        });

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            current_job: None,
            dispatcher: args.dispatcher,
            pipeline: args.pipeline,
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        tracing::info!("Worker stopped: {}", state.worker_id);
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::ProcessJob { assignment } => {
                let assignment = *assignment;
                let job_id = assignment.job.id;
                state.current_job = Some(job_id);

                let outcome = state
                    .pipeline
                    .run(assignment.job, &state.worker_id, &assignment.cancel)
                    .await;
                tracing::debug!(
                    job_id = %job_id,
                    worker_id = %state.worker_id,
                    ?outcome,
                    "Run finished"
                );

                state.current_job = None;
                // The dispatcher is gone during shutdown.
                let _ = state.dispatcher.send_message(DispatcherMessage::JobFinished {
                    job_id,
                    worker_id: state.worker_id.clone(),
                });
            }

            WorkerMessage::Heartbeat => {
                // If idle, request a job
                if state.is_idle() {
                    let timeout = Duration::from_secs(5);
                    let result = ractor::rpc::call(
                        &state.dispatcher,
                        |reply| DispatcherMessage::RequestJob {
                            worker_id: state.worker_id.clone(),
                            reply,
                        },
                        Some(timeout),
                    )
                    .await;
                    if let Ok(ractor::rpc::CallResult::Success(Some(assignment))) = result {
                        // Claim the job now so queued heartbeats don't ask for more.
                        state.current_job = Some(assignment.job.id);
                        myself.send_message(WorkerMessage::ProcessJob {
                            assignment: Box::new(assignment),
                        })?;
                    }
                }
            }
        }

        Ok(())
    }
}
