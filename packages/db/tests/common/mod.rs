use crop_core::{BoundingBox, CropRequest, Job, ObjectLocation};
use db::{DbConfig, DbError, repositories::JobRepository};

/// Each call opens a fresh embedded in-memory datastore.
pub async fn setup_repo() -> Result<JobRepository, DbError> {
    db::open(&DbConfig::memory()).await
}

pub fn pending_job() -> Job {
    Job::new(CropRequest::new(
        ObjectLocation::new("test", "test", "world.tif"),
        "crop",
        BoundingBox::new(-140.0, 10.0, -60.0, 70.0),
    ))
}
