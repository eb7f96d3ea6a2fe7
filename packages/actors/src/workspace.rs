//! Per-job scratch directories.

use std::path::{Path, PathBuf};

use crop_core::JobId;

use crate::CleanupError;

/// A job's private directory under the workspace root.
///
/// Call [`Workspace::release`] once every file handle inside it is closed.
/// A workspace dropped without being released is removed synchronously.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Create `root/<job_id>/`, replacing leftovers from an earlier run.
    pub async fn acquire(root: &Path, job_id: JobId) -> std::io::Result<Self> {
        let path = root.join(job_id.to_string());
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_dir_all(&path).await?;
        }
        tokio::fs::create_dir_all(&path).await?;

        tracing::debug!(job_id = %job_id, path = ?path, "Workspace acquired");
        Ok(Self {
            path,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path for a file in the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Recursively delete the directory.
    pub async fn release(mut self) -> Result<(), CleanupError> {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = ?self.path, "Workspace released");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CleanupError {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = ?self.path, error = %e, "Failed to remove abandoned workspace");
        }
    }
}
