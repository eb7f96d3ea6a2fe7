//! Service-level settings.

use std::path::PathBuf;
use std::time::Duration;

use crate::ServiceError;

pub const DEFAULT_OUTPUT_BUCKET: &str = "pz-svcs-prevgen-output";
pub const DEFAULT_OUTPUT_DOMAIN: &str = "s3.amazonaws.com";
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Where crops run and where their results go.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Parent directory of the per-job workspaces.
    pub workspace_root: PathBuf,
    /// Bucket published crops are written to.
    pub output_bucket: String,
    /// Domain reported in result locations.
    pub output_domain: String,
    /// Number of jobs run at once.
    pub concurrency: usize,
    /// Pause before the single retry of a failed job store read.
    pub store_retry_delay: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("raster-crop"),
            output_bucket: DEFAULT_OUTPUT_BUCKET.to_string(),
            output_domain: DEFAULT_OUTPUT_DOMAIN.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            store_retry_delay: db::DEFAULT_RETRY_DELAY,
        }
    }
}

impl ServiceConfig {
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn with_output(mut self, domain: impl Into<String>, bucket: impl Into<String>) -> Self {
        self.output_domain = domain.into();
        self.output_bucket = bucket.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_store_retry_delay(mut self, delay: Duration) -> Self {
        self.store_retry_delay = delay;
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `RASTER_TEMP_DIR` (default: `<system temp>/raster-crop`)
    /// - `OUTPUT_BUCKET` (default: `pz-svcs-prevgen-output`)
    /// - `OUTPUT_DOMAIN` (default: `s3.amazonaws.com`)
    /// - `WORKER_CONCURRENCY` (default: 4, at least 1)
    /// - `STORE_RETRY_DELAY_MS` (default: 100)
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ServiceConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServiceError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let concurrency = match var("WORKER_CONCURRENCY") {
            Some(v) => match v.parse::<usize>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ServiceError::InvalidConfig(format!(
                        "WORKER_CONCURRENCY={v} (expected an integer >= 1)"
                    )));
                }
            },
            None => defaults.concurrency,
        };

        let store_retry_delay = match var("STORE_RETRY_DELAY_MS") {
            Some(v) => Duration::from_millis(v.parse::<u64>().map_err(|_| {
                ServiceError::InvalidConfig(format!(
                    "STORE_RETRY_DELAY_MS={v} (expected milliseconds)"
                ))
            })?),
            None => defaults.store_retry_delay,
        };

        Ok(Self {
            workspace_root: var("RASTER_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            output_bucket: var("OUTPUT_BUCKET").unwrap_or(defaults.output_bucket),
            output_domain: var("OUTPUT_DOMAIN").unwrap_or(defaults.output_domain),
            concurrency,
            store_retry_delay,
        })
    }
}
