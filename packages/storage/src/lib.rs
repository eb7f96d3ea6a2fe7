//! Remote object storage for source rasters and published crops.
//!
//! Backends:
//! - S3-compatible storage in production/staging
//! - On-disk storage for local dev
//! - In-memory storage for tests
//!
//! Implementation note:
//! This is a small wrapper around `object_store`, which already provides
//! S3, local filesystem, and in-memory backends. Requests name their own
//! bucket, so S3 stores are built per bucket; the filesystem and in-memory
//! backends keep every bucket under a `<bucket>/` path segment of one store.

use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use crop_core::ObjectLocation;
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use ulid::Ulid;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("invalid object key: {0:?}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

impl StorageError {
    /// Whether the named object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::ObjectStore(object_store::Error::NotFound { .. })
        )
    }
}

/// Moves rasters between remote storage and local scratch space.
pub trait ObjectTransfer: Send + Sync + 'static {
    /// Download `location` into `dir`, returning the local file path.
    fn fetch<'a>(
        &'a self,
        location: &'a ObjectLocation,
        dir: &'a FsPath,
    ) -> BoxFuture<'a, Result<PathBuf, StorageError>>;

    /// Upload `file` to `bucket` under a freshly generated key, returning the key.
    fn publish<'a>(
        &'a self,
        file: &'a FsPath,
        bucket: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>>;
}

impl<T: ObjectTransfer + ?Sized> ObjectTransfer for Arc<T> {
    fn fetch<'a>(
        &'a self,
        location: &'a ObjectLocation,
        dir: &'a FsPath,
    ) -> BoxFuture<'a, Result<PathBuf, StorageError>> {
        (**self).fetch(location, dir)
    }

    fn publish<'a>(
        &'a self,
        file: &'a FsPath,
        bucket: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        (**self).publish(file, bucket)
    }
}

/// S3 connection settings shared by every bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub endpoint: Option<String>,
    pub allow_http: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub virtual_hosted_style: bool,
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to published object keys.
    pub prefix: Option<String>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self {
            backend: StorageBackendConfig::S3(cfg),
            prefix: None,
        }
    }

    /// Set the key prefix for published objects.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_empty(prefix.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// Selection rules:
    /// - If `STORAGE_BACKEND` is set: use it (`s3`, `filesystem`, `memory`)
    /// - Otherwise: default to filesystem (`./data/object_store`)
    ///
    /// S3 env vars (S3-compatible):
    /// - `AWS_REGION` (default: `us-east-1`)
    /// - `S3_ENDPOINT` (optional, e.g. `http://localhost:9000`)
    /// - `S3_ALLOW_HTTP` (`true`/`false`, default: auto true if endpoint is http://)
    /// - `S3_VIRTUAL_HOSTED_STYLE` (`true`/`false`, default: false)
    /// - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN` (optional; also picked up from the ambient AWS environment by the SDK)
    ///
    /// Filesystem env vars:
    /// - `STORAGE_FS_ROOT` (default: `./data/object_store`)
    ///
    /// Common:
    /// - `STORAGE_PREFIX` (optional, e.g. `crops/`)
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("STORAGE_BACKEND").ok();
        let prefix = std::env::var("STORAGE_PREFIX").ok().and_then(non_empty);

        let cfg = match backend.as_deref() {
            Some("s3") => Self::s3(read_s3_config()?),
            Some("filesystem") | Some("fs") | None => Self::filesystem(read_fs_root()),
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported STORAGE_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        Ok(Self { prefix, ..cfg })
    }
}

enum Backend {
    /// One store for all buckets; the bucket is the first path segment.
    Shared(Arc<dyn ObjectStore>),
    /// One S3 client per bucket, built on first use.
    PerBucket {
        config: S3Config,
        stores: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
    },
}

#[derive(Clone)]
pub struct Storage {
    backend: Arc<Backend>,
    prefix: Option<String>,
}

impl Storage {
    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, backend) = match cfg.backend {
            StorageBackendConfig::S3(s3) => (
                "s3",
                Backend::PerBucket {
                    config: s3,
                    stores: RwLock::new(HashMap::new()),
                },
            ),
            StorageBackendConfig::Filesystem { root } => {
                ensure_dir(&root).await?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                ("filesystem", Backend::Shared(Arc::new(fs)))
            }
            StorageBackendConfig::Memory => {
                let mem = object_store::memory::InMemory::new();
                ("memory", Backend::Shared(Arc::new(mem)))
            }
        };

        tracing::info!(backend = kind, "Object storage ready");

        Ok(Self {
            backend: Arc::new(backend),
            prefix: cfg.prefix.and_then(non_empty),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    /// Resolve the store and in-store path for `bucket`/`key`.
    async fn resolve(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<(Arc<dyn ObjectStore>, Path), StorageError> {
        let bucket = bucket.trim_matches('/');
        let key = key.trim_start_matches('/');
        if bucket.is_empty() {
            return Err(StorageError::InvalidKey(bucket.to_string()));
        }
        if key.is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        match self.backend.as_ref() {
            Backend::Shared(store) => Ok((store.clone(), Path::from(format!("{bucket}/{key}")))),
            Backend::PerBucket { config, stores } => {
                if let Some(store) = stores.read().await.get(bucket) {
                    return Ok((store.clone(), Path::from(key)));
                }

                let mut stores = stores.write().await;
                let store = match stores.get(bucket) {
                    Some(store) => store.clone(),
                    None => {
                        tracing::debug!(bucket, "Building S3 client");
                        let store: Arc<dyn ObjectStore> = Arc::new(build_s3(config, bucket)?);
                        stores.insert(bucket.to_string(), store.clone());
                        store
                    }
                };
                Ok((store, Path::from(key)))
            }
        }
    }

    fn published_key(&self, file_name: &str) -> String {
        let key = format!("{}-{}", Ulid::new(), file_name);
        match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{key}"),
            _ => key,
        }
    }

    pub async fn put_bytes(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let (store, path) = self.resolve(bucket, key).await?;
        store
            .put(&path, object_store::PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    pub async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Bytes, StorageError> {
        let (store, path) = self.resolve(bucket, key).await?;
        let res = store.get(&path).await?;
        Ok(res.bytes().await?)
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        let (store, path) = self.resolve(bucket, key).await?;
        store.delete(&path).await?;
        Ok(())
    }

    /// Stream an object into `dir`, named after the last segment of its key.
    pub async fn fetch_to(
        &self,
        location: &ObjectLocation,
        dir: &FsPath,
    ) -> Result<PathBuf, StorageError> {
        let file_name = local_file_name(&location.file_name)?;
        let (store, path) = self.resolve(&location.bucket_name, &location.file_name).await?;

        let mut stream = store.get(&path).await?.into_stream();
        let dest = dir.join(file_name);
        let mut file = tokio::fs::File::create(&dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(source = %location, bytes = written, dest = ?dest, "Fetched object");
        Ok(dest)
    }

    /// Upload a local file under `<ulid>-<file name>` and return the key.
    pub async fn publish_file(&self, file: &FsPath, bucket: &str) -> Result<String, StorageError> {
        let file_name = file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidKey(file.display().to_string()))?;
        let key = self.published_key(file_name);

        let bytes = tokio::fs::read(file).await?;
        let size = bytes.len();
        self.put_bytes(bucket, &key, Bytes::from(bytes)).await?;

        tracing::debug!(bucket, key = %key, bytes = size, "Published object");
        Ok(key)
    }
}

impl ObjectTransfer for Storage {
    fn fetch<'a>(
        &'a self,
        location: &'a ObjectLocation,
        dir: &'a FsPath,
    ) -> BoxFuture<'a, Result<PathBuf, StorageError>> {
        Box::pin(self.fetch_to(location, dir))
    }

    fn publish<'a>(
        &'a self,
        file: &'a FsPath,
        bucket: &'a str,
    ) -> BoxFuture<'a, Result<String, StorageError>> {
        Box::pin(self.publish_file(file, bucket))
    }
}

/// Last path segment of an object key, usable as a local file name.
fn local_file_name(key: &str) -> Result<&str, StorageError> {
    key.rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .ok_or_else(|| StorageError::InvalidKey(key.to_string()))
}

async fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(root).await?;
    Ok(())
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_fs_root() -> PathBuf {
    std::env::var("STORAGE_FS_ROOT")
        .ok()
        .and_then(non_empty)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./data/object_store"))
}

fn parse_bool_env(var_name: &str) -> Result<Option<bool>, StorageError> {
    let v = match std::env::var(var_name) {
        Ok(v) => v,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(StorageError::InvalidConfig(format!(
                "failed reading {var_name}: {e}"
            )));
        }
    };

    let normalized = v.trim().to_ascii_lowercase();
    let parsed = match normalized.as_str() {
        "1" | "true" | "yes" | "y" => true,
        "0" | "false" | "no" | "n" => false,
        _ => {
            return Err(StorageError::InvalidConfig(format!(
                "invalid boolean for {var_name}={v} (expected true/false)"
            )));
        }
    };
    Ok(Some(parsed))
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let region = std::env::var("AWS_REGION")
        .ok()
        .and_then(non_empty)
        .unwrap_or_else(|| "us-east-1".to_string());

    let endpoint = std::env::var("S3_ENDPOINT").ok().and_then(non_empty);
    let allow_http = match parse_bool_env("S3_ALLOW_HTTP")? {
        Some(v) => v,
        None => endpoint
            .as_deref()
            .is_some_and(|e| e.trim_start().to_ascii_lowercase().starts_with("http://")),
    };

    let virtual_hosted_style = parse_bool_env("S3_VIRTUAL_HOSTED_STYLE")?.unwrap_or(false);

    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok().and_then(non_empty);
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .ok()
        .and_then(non_empty);
    let session_token = std::env::var("AWS_SESSION_TOKEN").ok().and_then(non_empty);

    Ok(S3Config {
        region,
        endpoint,
        allow_http,
        access_key_id,
        secret_access_key,
        session_token,
        virtual_hosted_style,
    })
}

fn build_s3(cfg: &S3Config, bucket: &str) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(bucket)
        .with_region(cfg.region.as_str())
        .with_virtual_hosted_style_request(cfg.virtual_hosted_style);

    if let Some(endpoint) = &cfg.endpoint {
        builder = builder.with_endpoint(endpoint.as_str());
    }
    if cfg.allow_http {
        builder = builder.with_allow_http(true);
    }
    if let Some(access_key_id) = &cfg.access_key_id {
        builder = builder.with_access_key_id(access_key_id.as_str());
    }
    if let Some(secret_access_key) = &cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key.as_str());
    }
    if let Some(session_token) = &cfg.session_token {
        builder = builder.with_token(session_token.as_str());
    }

    Ok(builder.build()?)
}
