#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crop_core::{BoundingBox, CropRequest, Job, JobEvent, ObjectLocation};
use db::{JobStore, MemoryJobStore};
use futures_util::future::BoxFuture;
use raster::{Coverage, Envelope, GeoTiffCodec, GeoTransform, GridCropEngine, RasterCodec, RasterData};
use storage::{ObjectTransfer, Storage, StorageConfig, StorageError};
use tempfile::TempDir;
use tokio::sync::broadcast;

use actors::{Destination, PipelineContext};

pub const SOURCE_BUCKET: &str = "test";
pub const OUTPUT_BUCKET: &str = "output";
pub const OUTPUT_DOMAIN: &str = "s3.test.local";

/// One-degree global grid covering -180..180 x -90..90.
pub fn world() -> Coverage {
    let extent = Envelope::new(-180.0, -90.0, 180.0, 90.0);
    let data = (0..180u32)
        .flat_map(|row| (0..360u32).map(move |col| ((row * 7 + col) % 256) as u8))
        .collect();
    Coverage::new(
        360,
        180,
        1,
        RasterData::U8(data),
        GeoTransform::covering(&extent, 360, 180),
    )
    .unwrap()
}

/// `world()` encoded as a GeoTIFF.
pub fn world_tiff() -> Bytes {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.tif");
    GeoTiffCodec.write(&world(), &path).unwrap();
    Bytes::from(std::fs::read(&path).unwrap())
}

pub fn request(bounds: BoundingBox) -> CropRequest {
    CropRequest::new(
        ObjectLocation::new("test", SOURCE_BUCKET, "world.tif"),
        "crop",
        bounds,
    )
}

pub fn americas() -> BoundingBox {
    BoundingBox::new(-140.0, 10.0, -60.0, 70.0)
}

/// Decode a published object.
pub async fn read_published(storage: &Storage, key: &str) -> Coverage {
    let bytes = storage.get_bytes(OUTPUT_BUCKET, key).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("published.tif");
    std::fs::write(&path, &bytes).unwrap();
    GeoTiffCodec.read_file(&path).unwrap()
}

/// Entries left under a workspace root.
pub fn leftovers(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

pub struct Fixture {
    pub store: Arc<MemoryJobStore>,
    pub storage: Storage,
    pub scratch: TempDir,
    pub events: broadcast::Receiver<JobEvent>,
    pub event_tx: broadcast::Sender<JobEvent>,
}

impl Fixture {
    /// Memory job store, memory object storage seeded with `test/world.tif`.
    pub async fn new() -> Self {
        let storage = Storage::new(StorageConfig::memory()).await.unwrap();
        storage
            .put_bytes(SOURCE_BUCKET, "world.tif", world_tiff())
            .await
            .unwrap();
        let (event_tx, events) = broadcast::channel(64);

        Self {
            store: Arc::new(MemoryJobStore::new()),
            storage,
            scratch: tempfile::tempdir().unwrap(),
            events,
            event_tx,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        self.scratch.path()
    }

    pub fn context(&self) -> PipelineContext {
        self.context_with(Arc::new(self.storage.clone()), self.store.clone())
    }

    pub fn context_with(
        &self,
        objects: Arc<dyn ObjectTransfer>,
        store: Arc<dyn JobStore>,
    ) -> PipelineContext {
        PipelineContext {
            store,
            objects,
            engine: Arc::new(GridCropEngine),
            codec: Arc::new(GeoTiffCodec),
            workspace_root: self.scratch.path().to_path_buf(),
            destination: Destination::new(OUTPUT_DOMAIN, OUTPUT_BUCKET),
            event_tx: self.event_tx.clone(),
        }
    }

    /// Record a PENDING job the way submission does.
    pub async fn pending(&self, bounds: BoundingBox) -> Job {
        let job = Job::new(request(bounds));
        self.store.put(&job).await.unwrap();
        job
    }

    /// Poll the store until `job` is terminal.
    pub async fn wait_terminal(&self, job: &Job) -> Job {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Ok(current) = self.store.get(job.id).await
                    && current.status.is_terminal()
                {
                    return current;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    /// Next event matching `pred`, skipping others.
    pub async fn next_event(&mut self, pred: impl Fn(&JobEvent) -> bool) -> JobEvent {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let event = self.events.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("event did not arrive in time")
    }
}

/// Object transfer that delegates fetches but refuses every publish.
pub struct RejectingPublish(pub Storage);

impl ObjectTransfer for RejectingPublish {
    fn fetch<'a>(
        &'a self,
        location: &'a ObjectLocation,
        dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, StorageError>> {
        self.0.fetch(location, dir)
    }

    fn publish<'a>(
        &'a self,
        _file: &'a Path,
        bucket: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(async move { Err(StorageError::InvalidConfig(format!("no such bucket {bucket}"))) })
    }
}

/// Object transfer whose fetches wait for a permit first.
pub struct GatedTransfer {
    pub inner: Storage,
    pub gate: Arc<tokio::sync::Semaphore>,
}

impl GatedTransfer {
    pub fn new(inner: Storage) -> Self {
        Self {
            inner,
            gate: Arc::new(tokio::sync::Semaphore::new(0)),
        }
    }
}

impl ObjectTransfer for GatedTransfer {
    fn fetch<'a>(
        &'a self,
        location: &'a ObjectLocation,
        dir: &'a Path,
    ) -> BoxFuture<'a, Result<PathBuf, StorageError>> {
        Box::pin(async move {
            let permit = self.gate.acquire().await.map_err(std::io::Error::other)?;
            permit.forget();
            self.inner.fetch(location, dir).await
        })
    }

    fn publish<'a>(
        &'a self,
        file: &'a Path,
        bucket: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        self.inner.publish(file, bucket)
    }
}
