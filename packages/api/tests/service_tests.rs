#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use api::{BoundingBox, CropRequest, JobEvent, ObjectLocation, ServiceError, StatusKind};
use common::{GatedTransfer, OUTPUT_BUCKET, TestService, leftovers, payload, seeded_storage};

#[tokio::test]
async fn test_submitted_crop_is_published() {
    let ts = TestService::start().await;
    let mut events = ts.service.subscribe();

    let id = ts
        .service
        .submit_json(&payload(-140.0, 10.0, -60.0, 70.0))
        .await
        .unwrap()
        .to_string();

    let update = ts.wait_terminal(&id).await;
    assert_eq!(update.status, StatusKind::Success);
    assert_eq!(update.progress, 100);

    let result = ts.service.result(&id).await.unwrap();
    assert_eq!(result.mime_type, "image/tiff");
    assert_eq!(result.bucket_name(), OUTPUT_BUCKET);
    assert_eq!(result.domain(), "s3.test.local");
    assert!(!result.file_name().is_empty());
    assert!(result.file_name().ends_with("-world.tif"));

    let published = ts.storage.get_bytes(OUTPUT_BUCKET, result.file_name()).await.unwrap();
    assert!(!published.is_empty());

    let resource = ts.service.job(&id).await.unwrap();
    assert_eq!(resource.service_resource_id, id);
    assert_eq!(resource.result, Some(result));
    assert!(resource.error_message.is_none());

    let mut seen = Vec::new();
    while !seen.iter().any(|e| matches!(e, JobEvent::JobSucceeded { .. })) {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.job_id().to_string(), id);
        seen.push(event);
    }
    assert!(seen.iter().any(|e| matches!(e, JobEvent::JobSubmitted { .. })));
    assert!(seen.iter().any(|e| matches!(e, JobEvent::JobStarted { .. })));

    assert!(leftovers(ts.workspace_root()).is_empty());
    ts.service.shutdown().await;
}

#[tokio::test]
async fn test_invalid_request_creates_nothing() {
    let ts = TestService::start().await;

    let err = ts
        .service
        .submit_json(&payload(-60.0, 10.0, -60.0, 70.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let err = ts.service.submit_json("{\"function\":\"crop\"}").await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    assert!(ts.store.is_empty().await);
    assert!(leftovers(ts.workspace_root()).is_empty());
    ts.service.shutdown().await;
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let ts = TestService::start().await;

    assert!(matches!(
        ts.service.status("unknown-id").await,
        Err(ServiceError::NotFound(_))
    ));

    let unknown = api::JobId::new().to_string();
    assert!(matches!(
        ts.service.status(&unknown).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        ts.service.result(&unknown).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        ts.service.job(&unknown).await,
        Err(ServiceError::NotFound(_))
    ));

    ts.service.delete(&unknown).await.unwrap();
    ts.service.delete("unknown-id").await.unwrap();
    ts.service.shutdown().await;
}

#[tokio::test]
async fn test_identical_payloads_get_distinct_jobs() {
    let ts = TestService::start().await;
    let body = payload(-140.0, 10.0, -60.0, 70.0);

    let first = ts.service.submit_json(&body).await.unwrap().to_string();
    let second = ts.service.submit_json(&body).await.unwrap().to_string();
    assert_ne!(first, second);

    assert_eq!(ts.wait_terminal(&first).await.status, StatusKind::Success);
    assert_eq!(ts.wait_terminal(&second).await.status, StatusKind::Success);

    let a = ts.service.result(&first).await.unwrap();
    let b = ts.service.result(&second).await.unwrap();
    assert_ne!(a.file_name(), b.file_name());
    ts.service.shutdown().await;
}

#[tokio::test]
async fn test_result_is_not_ready_while_running() {
    let storage = seeded_storage().await;
    let gated = Arc::new(GatedTransfer::new(storage.clone()));
    let gate = gated.gate.clone();
    let ts = TestService::start_with(storage, gated).await;

    let id = ts
        .service
        .submit_json(&payload(-140.0, 10.0, -60.0, 70.0))
        .await
        .unwrap()
        .to_string();
    ts.wait_for(&id, StatusKind::Running).await;

    match ts.service.result(&id).await {
        Err(ServiceError::ResultNotReady { status, .. }) => assert_eq!(status, StatusKind::Running),
        other => panic!("expected ResultNotReady, got {other:?}"),
    }
    let resource = ts.service.job(&id).await.unwrap();
    assert!(resource.result.is_none());

    gate.add_permits(1);
    assert_eq!(ts.wait_terminal(&id).await.status, StatusKind::Success);
    assert!(ts.service.result(&id).await.is_ok());
    ts.service.shutdown().await;
}

#[tokio::test]
async fn test_failed_job_reports_its_error() {
    let ts = TestService::start().await;

    let request = CropRequest::new(
        ObjectLocation::new("s3.amazonaws.com", "test", "missing.tif"),
        "crop",
        BoundingBox::new(-140.0, 10.0, -60.0, 70.0),
    );
    let id = ts.service.submit(request).await.unwrap().to_string();

    let update = ts.wait_terminal(&id).await;
    assert_eq!(update.status, StatusKind::Fail);

    match ts.service.result(&id).await {
        Err(ServiceError::JobFailed { error, .. }) => assert!(error.starts_with("fetch:")),
        other => panic!("expected JobFailed, got {other:?}"),
    }

    let value = serde_json::to_value(ts.service.job(&id).await.unwrap()).unwrap();
    assert_eq!(value["status"]["status"], "Fail");
    assert!(value["result"].is_null());
    assert!(value["errorMessage"].as_str().unwrap().contains("fetch"));

    assert!(leftovers(ts.workspace_root()).is_empty());
    ts.service.shutdown().await;
}

#[tokio::test]
async fn test_deleted_job_stays_deleted() {
    let storage = seeded_storage().await;
    let gated = Arc::new(GatedTransfer::new(storage.clone()));
    let gate = gated.gate.clone();
    let ts = TestService::start_with(storage, gated).await;

    let id = ts
        .service
        .submit_json(&payload(-140.0, 10.0, -60.0, 70.0))
        .await
        .unwrap()
        .to_string();
    ts.wait_for(&id, StatusKind::Running).await;

    ts.service.delete(&id).await.unwrap();
    assert!(matches!(
        ts.service.status(&id).await,
        Err(ServiceError::NotFound(_))
    ));

    // Let the fetch finish; the run must notice the delete and write nothing.
    gate.add_permits(1);
    tokio::time::timeout(Duration::from_secs(10), async {
        while !leftovers(ts.workspace_root()).is_empty()
            || ts.service.stats().await.unwrap().running > 0
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("run did not wind down");

    assert!(matches!(
        ts.service.status(&id).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(ts.store.is_empty().await);
    ts.service.shutdown().await;
}

#[tokio::test]
async fn test_deleted_queued_job_never_runs() {
    let storage = seeded_storage().await;
    let gated = Arc::new(GatedTransfer::new(storage.clone()));
    let gate = gated.gate.clone();
    let ts = TestService::start_with(storage, gated).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let id = ts
            .service
            .submit_json(&payload(-140.0, 10.0, -60.0, 70.0))
            .await
            .unwrap();
        ids.push(id.to_string());
    }
    // Both workers are blocked in their fetch, so the third job is queued.
    ts.wait_for(&ids[0], StatusKind::Running).await;
    ts.wait_for(&ids[1], StatusKind::Running).await;
    assert_eq!(ts.service.status(&ids[2]).await.unwrap().status, StatusKind::Pending);

    ts.service.delete(&ids[2]).await.unwrap();
    assert!(matches!(
        ts.service.status(&ids[2]).await,
        Err(ServiceError::NotFound(_))
    ));

    gate.add_permits(3);
    for id in &ids[..2] {
        assert_eq!(ts.wait_terminal(id).await.status, StatusKind::Success);
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(
        ts.service.status(&ids[2]).await,
        Err(ServiceError::NotFound(_))
    ));
    assert_eq!(ts.store.len().await, 2);
    let stats = ts.service.stats().await.unwrap();
    assert_eq!((stats.pending, stats.running), (0, 0));
    ts.service.shutdown().await;
}

#[tokio::test]
async fn test_crop_now_skips_the_job_store() {
    let ts = TestService::start().await;

    let request = CropRequest::from_json(&payload(-10.0, -10.0, 10.0, 10.0)).unwrap();
    let result = ts.service.crop_now(&request).await.unwrap();
    assert_eq!(result.bucket_name(), OUTPUT_BUCKET);
    assert!(ts.storage.get_bytes(OUTPUT_BUCKET, result.file_name()).await.is_ok());

    let bad = CropRequest::from_json(&payload(10.0, -10.0, -10.0, 10.0)).unwrap();
    assert!(matches!(
        ts.service.crop_now(&bad).await,
        Err(ServiceError::Validation(_))
    ));

    assert!(ts.store.is_empty().await);
    assert!(leftovers(ts.workspace_root()).is_empty());
    ts.service.shutdown().await;
}
