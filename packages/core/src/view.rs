//! Client-facing read surface of a job record.

use serde::{Deserialize, Serialize};

use crate::{Job, JobStatus, ResultLocation};

/// Coarse status as reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusKind {
    Pending,
    Running,
    Success,
    Fail,
}

impl StatusKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusKind::Success | StatusKind::Fail)
    }
}

impl From<&JobStatus> for StatusKind {
    fn from(status: &JobStatus) -> Self {
        match status {
            JobStatus::Pending => StatusKind::Pending,
            JobStatus::Running { .. } => StatusKind::Running,
            JobStatus::Success { .. } => StatusKind::Success,
            JobStatus::Failed { .. } => StatusKind::Fail,
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusKind::Pending => write!(f, "Pending"),
            StatusKind::Running => write!(f, "Running"),
            StatusKind::Success => write!(f, "Success"),
            StatusKind::Fail => write!(f, "Fail"),
        }
    }
}

/// Status and progress of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: StatusKind,
    pub progress: u8,
}

impl From<&Job> for StatusUpdate {
    fn from(job: &Job) -> Self {
        Self {
            status: StatusKind::from(&job.status),
            progress: job.progress,
        }
    }
}

/// Full job record as returned to polling clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResource {
    pub service_resource_id: String,
    pub status: StatusUpdate,
    pub result: Option<ResultLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&Job> for ServiceResource {
    fn from(job: &Job) -> Self {
        Self {
            service_resource_id: job.id.to_string(),
            status: StatusUpdate::from(job),
            result: job.result().cloned(),
            error_message: job.error_message().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;
    use crate::{BoundingBox, CropRequest, ObjectLocation};

    fn job() -> Job {
        Job::new(CropRequest::new(
            ObjectLocation::new("test", "test", "world.tif"),
            "crop",
            BoundingBox::new(-140.0, 10.0, -60.0, 70.0),
        ))
    }

    #[test]
    fn pending_record_has_null_result() {
        let job = job();
        let value = serde_json::to_value(ServiceResource::from(&job)).unwrap();

        assert_eq!(value["serviceResourceId"], job.id.to_string());
        assert_eq!(value["status"]["status"], "Pending");
        assert_eq!(value["status"]["progress"], 0);
        assert!(value["result"].is_null());
        assert!(value.get("errorMessage").is_none());
    }

    #[test]
    fn successful_record_carries_location() {
        let mut job = job();
        job.start().unwrap();
        job.succeed(ResultLocation::geotiff(ObjectLocation::new(
            "s3.amazonaws.com",
            "out",
            "01J-world.tif",
        )))
        .unwrap();

        let value = serde_json::to_value(ServiceResource::from(&job)).unwrap();
        assert_eq!(value["status"]["status"], "Success");
        assert_eq!(value["status"]["progress"], 100);
        assert_eq!(value["result"]["mimeType"], "image/tiff");
        assert_eq!(value["result"]["location"]["fileName"], "01J-world.tif");
        assert_eq!(value["result"]["location"]["domain"], "s3.amazonaws.com");
    }

    #[test]
    fn failed_record_reports_fail_and_message() {
        let mut job = job();
        job.start().unwrap();
        job.fail("publish: access denied").unwrap();

        let view = ServiceResource::from(&job);
        assert_eq!(view.status.status, StatusKind::Fail);
        assert!(view.result.is_none());
        assert_eq!(view.error_message.as_deref(), Some("publish: access denied"));
    }
}
