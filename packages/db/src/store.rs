//! The job store abstraction and its in-process implementations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crop_core::{Job, JobId};
use futures_util::future::BoxFuture;
use tokio::sync::RwLock;

use crate::DbError;

/// Default pause before the single retry of a failed read.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Key-value persistence of job records.
///
/// Every write replaces the whole record for its id. There is no partial update:
/// the shape of a record depends on its status, so a field-level patch could leave
/// a record whose result disagrees with its status.
pub trait JobStore: Send + Sync + 'static {
    /// Load the record for `id`, or `DbError::NotFound`.
    fn get(&self, id: JobId) -> BoxFuture<'_, Result<Job, DbError>>;

    /// Insert or replace the record for `job.id`.
    fn put<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, Result<(), DbError>>;

    /// Remove the record for `id`. Removing an absent id succeeds.
    fn delete(&self, id: JobId) -> BoxFuture<'_, Result<(), DbError>>;
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn get(&self, id: JobId) -> BoxFuture<'_, Result<Job, DbError>> {
        (**self).get(id)
    }

    fn put<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, Result<(), DbError>> {
        (**self).put(job)
    }

    fn delete(&self, id: JobId) -> BoxFuture<'_, Result<(), DbError>> {
        (**self).delete(id)
    }
}

/// Process-local job store.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

impl JobStore for MemoryJobStore {
    fn get(&self, id: JobId) -> BoxFuture<'_, Result<Job, DbError>> {
        Box::pin(async move {
            self.jobs
                .read()
                .await
                .get(&id)
                .cloned()
                .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
        })
    }

    fn put<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, Result<(), DbError>> {
        Box::pin(async move {
            self.jobs.write().await.insert(job.id, job.clone());
            Ok(())
        })
    }

    fn delete(&self, id: JobId) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(async move {
            self.jobs.write().await.remove(&id);
            Ok(())
        })
    }
}

/// Store wrapper whose reads survive one transient failure.
///
/// A transient `get` failure is retried once after `delay`; a second transient
/// failure is reported as `DbError::Unavailable`. Writes pass straight through.
pub struct RetryingJobStore<S> {
    inner: S,
    delay: Duration,
}

impl<S: JobStore> RetryingJobStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set the pause before the retry.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: JobStore> JobStore for RetryingJobStore<S> {
    fn get(&self, id: JobId) -> BoxFuture<'_, Result<Job, DbError>> {
        Box::pin(async move {
            match self.inner.get(id).await {
                Err(first) if first.is_transient() => {
                    tracing::warn!(job_id = %id, error = %first, "Job store read failed, retrying once");
                    tokio::time::sleep(self.delay).await;
                    self.inner.get(id).await.map_err(|second| {
                        if second.is_transient() {
                            DbError::Unavailable(second.to_string())
                        } else {
                            second
                        }
                    })
                }
                other => other,
            }
        })
    }

    fn put<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, Result<(), DbError>> {
        self.inner.put(job)
    }

    fn delete(&self, id: JobId) -> BoxFuture<'_, Result<(), DbError>> {
        self.inner.delete(id)
    }
}
