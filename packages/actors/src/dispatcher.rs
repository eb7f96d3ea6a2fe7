//! Dispatcher actor: the pending FIFO, in-flight tokens, and the worker pool.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crop_core::{Job, JobId};
use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr, SupervisionEvent};
use tokio_util::sync::CancellationToken;

use crate::messages::{
    Assignment, CancelOutcome, DispatcherMessage, DispatcherStats, WorkerMessage,
};
use crate::pipeline::Pipeline;
use crate::worker_actor::{WorkerActor, WorkerArgs};

/// State for the dispatcher actor.
pub struct DispatcherState {
    /// Jobs waiting for a worker, oldest first.
    pending: VecDeque<Job>,
    /// Cancellation tokens of jobs a worker has picked up.
    running: HashMap<JobId, CancellationToken>,
    /// Worker actors spawned at startup.
    workers: Vec<ActorRef<WorkerMessage>>,
    /// Whether new jobs are still handed out.
    accepting: bool,
}

impl DispatcherState {
    fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            pending: self.pending.len(),
            running: self.running.len(),
            workers: self.workers.len(),
        }
    }
}

/// Dispatcher arguments.
pub struct DispatcherArgs {
    pub pipeline: Arc<Pipeline>,
    /// Number of workers, each running one job at a time.
    pub concurrency: usize,
}

/// Hands queued jobs to idle workers and routes cancellations.
pub struct Dispatcher;

impl Actor for Dispatcher {
    type Msg = DispatcherMessage;
    type State = DispatcherState;
    type Arguments = DispatcherArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting dispatcher with {} workers", args.concurrency);

        let mut workers = Vec::with_capacity(args.concurrency);
        for n in 1..=args.concurrency {
            let worker_id = format!("worker-{}", n);
            let worker_args = WorkerArgs {
                worker_id: worker_id.clone(),
                dispatcher: myself.clone(),
                pipeline: Arc::clone(&args.pipeline),
            };
            let (worker, _handle) =
                Actor::spawn_linked(None, WorkerActor, worker_args, myself.get_cell())
                    .await
                    .map_err(|e| {
                        ActorProcessingErr::from(format!("Failed to spawn {}: {}", worker_id, e))
                    })?;
            workers.push(worker);
        }

        Ok(DispatcherState {
            pending: VecDeque::new(),
            running: HashMap::new(),
            workers,
            accepting: true,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DispatcherMessage::Dispatch { job } => {
                if !state.accepting {
                    tracing::warn!(job_id = %job.id, "Dispatcher stopping, job left pending");
                    return Ok(());
                }
                tracing::debug!(job_id = %job.id, queued = state.pending.len() + 1, "Job queued");
                state.pending.push_back(*job);
            }

            DispatcherMessage::RequestJob { worker_id, reply } => {
                if !state.accepting {
                    let _ = reply.send(None);
                    return Ok(());
                }

                let assignment = state.pending.pop_front().map(|job| {
                    let cancel = CancellationToken::new();
                    state.running.insert(job.id, cancel.clone());
                    tracing::debug!(job_id = %job.id, worker_id = %worker_id, "Job assigned");
                    Assignment { job, cancel }
                });

                // The worker timed out waiting; put the job back at the front.
                if let Err(MessagingErr::SendErr(Some(Assignment { job, .. }))) =
                    reply.send(assignment)
                {
                    state.running.remove(&job.id);
                    state.pending.push_front(job);
                }
            }

            DispatcherMessage::JobFinished { job_id, worker_id } => {
                state.running.remove(&job_id);
                tracing::debug!(job_id = %job_id, worker_id = %worker_id, "Worker released job");
            }

            DispatcherMessage::Cancel { job_id, reply } => {
                let queued = state.pending.iter().position(|j| j.id == job_id);
                let outcome = if let Some(pos) = queued {
                    state.pending.remove(pos);
                    CancelOutcome::Dequeued
                } else if let Some(token) = state.running.get(&job_id) {
                    token.cancel();
                    CancelOutcome::Signalled
                } else {
                    CancelOutcome::Unknown
                };

                tracing::debug!(job_id = %job_id, ?outcome, "Cancel requested");
                let _ = reply.send(outcome);
            }

            DispatcherMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            DispatcherMessage::Shutdown => {
                tracing::info!(
                    "Shutting down dispatcher ({} pending, {} running)",
                    state.pending.len(),
                    state.running.len()
                );
                state.accepting = false;
                state.pending.clear();

                // A stop is seen between messages, so each worker finishes its
                // current run first. Stopping the dispatcher would kill them.
                let workers = state.workers.clone();
                tokio::spawn(async move {
                    for worker in workers {
                        if let Err(e) = worker.stop_and_wait(None, None).await {
                            tracing::debug!("Worker {} already gone: {}", worker.get_id(), e);
                        }
                    }
                    myself.stop(None);
                });
                return Ok(());
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        _state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::debug!("Worker {} terminated: {:?}", cell.get_id(), reason);
            }
            SupervisionEvent::ActorFailed(cell, err) => {
                tracing::error!("Worker {} failed: {}", cell.get_id(), err);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Spawn the dispatcher and its workers.
pub async fn start_dispatcher(
    pipeline: Arc<Pipeline>,
    concurrency: usize,
) -> Result<(ActorRef<DispatcherMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let args = DispatcherArgs {
        pipeline,
        concurrency: concurrency.max(1),
    };
    Actor::spawn(None, Dispatcher, args).await
}
