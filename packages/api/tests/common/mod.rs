#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use api::{CropService, ServiceConfig, StatusKind, StatusUpdate};
use bytes::Bytes;
use db::MemoryJobStore;
use futures_util::future::BoxFuture;
use crop_core::ObjectLocation;
use raster::{Coverage, Envelope, GeoTiffCodec, GeoTransform, RasterCodec, RasterData};
use storage::{ObjectTransfer, Storage, StorageConfig, StorageError};
use tempfile::TempDir;

pub const OUTPUT_BUCKET: &str = "output";

/// One-degree global grid, encoded as a GeoTIFF.
pub fn world_tiff() -> Bytes {
    let extent = Envelope::new(-180.0, -90.0, 180.0, 90.0);
    let data = (0..180u32)
        .flat_map(|row| (0..360u32).map(move |col| ((row + col) % 256) as u8))
        .collect();
    let world = Coverage::new(
        360,
        180,
        1,
        RasterData::U8(data),
        GeoTransform::covering(&extent, 360, 180),
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("world.tif");
    GeoTiffCodec.write(&world, &path).unwrap();
    Bytes::from(std::fs::read(&path).unwrap())
}

pub fn payload(minx: f64, miny: f64, maxx: f64, maxy: f64) -> String {
    serde_json::json!({
        "source": {
            "domain": "s3.amazonaws.com",
            "bucketName": "test",
            "fileName": "world.tif"
        },
        "function": "crop",
        "bounds": { "minx": minx, "miny": miny, "maxx": maxx, "maxy": maxy }
    })
    .to_string()
}

/// Memory storage seeded with `test/world.tif`.
pub async fn seeded_storage() -> Storage {
    let storage = Storage::new(StorageConfig::memory()).await.unwrap();
    storage
        .put_bytes("test", "world.tif", world_tiff())
        .await
        .unwrap();
    storage
}

pub struct TestService {
    pub service: CropService,
    pub store: Arc<MemoryJobStore>,
    pub storage: Storage,
    pub scratch: TempDir,
}

impl TestService {
    pub async fn start() -> Self {
        let storage = seeded_storage().await;
        Self::start_with(storage.clone(), Arc::new(storage)).await
    }

    pub async fn start_with(storage: Storage, objects: Arc<dyn ObjectTransfer>) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let config = ServiceConfig::default()
            .with_workspace_root(scratch.path())
            .with_output("s3.test.local", OUTPUT_BUCKET)
            .with_concurrency(2)
            .with_store_retry_delay(Duration::from_millis(5));
        let service = CropService::start(config, store.clone(), objects)
            .await
            .unwrap();

        Self {
            service,
            store,
            storage,
            scratch,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        self.scratch.path()
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait_terminal(&self, id: &str) -> StatusUpdate {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let update = self.service.status(id).await.unwrap();
                if update.status.is_terminal() {
                    return update;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("job did not finish in time")
    }

    /// Poll until the job reaches `status`.
    pub async fn wait_for(&self, id: &str, status: StatusKind) {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if self.service.status(id).await.unwrap().status == status {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job did not reach status in time")
    }
}

/// Entries left under a workspace root.
pub fn leftovers(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
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
