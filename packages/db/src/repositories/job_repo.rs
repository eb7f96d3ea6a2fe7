//! SurrealDB-backed job repository.

use chrono::{DateTime, Utc};
use crop_core::{CropRequest, Job, JobId, JobStatus};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::schema::JOB_TABLE;
use crate::{Database, DbError, JobStore};

/// Repository for job persistence operations.
#[derive(Clone)]
pub struct JobRepository {
    db: Database,
}

/// Internal record type for SurrealDB. The job id is the record key.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Thing>,
    status: JobStatus,
    #[serde(default)]
    progress: u8,
    request: CropRequest,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRecord {
    fn from_job(job: &Job) -> Self {
        Self {
            id: None,
            status: job.status.clone(),
            progress: job.progress,
            request: job.request.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }

    fn into_job(self, job_id: JobId) -> Job {
        Job {
            id: job_id,
            status: self.status,
            progress: self.progress,
            request: self.request,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Get a job by ID.
    pub async fn find(&self, id: JobId) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self.db.select((JOB_TABLE, id.to_string())).await?;

        record
            .map(|r| r.into_job(id))
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }

    /// Insert or fully replace a job record.
    pub async fn upsert(&self, job: &Job) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self
            .db
            .upsert((JOB_TABLE, job.id.to_string()))
            .content(JobRecord::from_job(job))
            .await?;

        record
            .map(|r| r.into_job(job.id))
            .ok_or_else(|| DbError::Query(format!("Failed to write job {}", job.id)))
    }

    /// Delete a job. Deleting an absent job succeeds.
    pub async fn remove(&self, id: JobId) -> Result<(), DbError> {
        let _: Option<JobRecord> = self.db.delete((JOB_TABLE, id.to_string())).await?;

        Ok(())
    }
}

impl JobStore for JobRepository {
    fn get(&self, id: JobId) -> BoxFuture<'_, Result<Job, DbError>> {
        Box::pin(self.find(id))
    }

    fn put<'a>(&'a self, job: &'a Job) -> BoxFuture<'a, Result<(), DbError>> {
        Box::pin(async move {
            self.upsert(job).await?;
            Ok(())
        })
    }

    fn delete(&self, id: JobId) -> BoxFuture<'_, Result<(), DbError>> {
        Box::pin(self.remove(id))
    }
}
