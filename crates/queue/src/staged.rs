//! Handles to externally staged resources (uploaded files).
//!
//! Whoever owns a staged resource when its life ends is responsible for
//! calling [`StagedResource::release`] exactly once: the gateway on a failed
//! admission, the ingestion worker after processing. A [`ReleaseGuard`]
//! covers owners that are dropped before they get there.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::QueueError;
use crate::stats::IngestionStats;

/// A resource staged outside the pipeline that must be cleaned up.
///
/// Implementations are handles (a path, an object key); cloning one does not
/// copy the underlying resource.
#[async_trait]
pub trait StagedResource: fmt::Display + Clone + Send + Sync + 'static {
    /// Delete or otherwise free the underlying resource.
    async fn release(&self) -> Result<(), QueueError>;
}

/// An uploaded file written to the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// Wrap a file that has already been staged.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Move `source` into `staging_dir` under a unique name.
    ///
    /// Falls back to copy + remove when a rename crosses filesystems.
    pub async fn stage(source: &Path, staging_dir: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(staging_dir).await?;

        let stem = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload");
        let target = staging_dir.join(format!("{}-{}", Uuid::new_v4(), stem));

        if tokio::fs::rename(source, &target).await.is_err() {
            tokio::fs::copy(source, &target).await?;
            tokio::fs::remove_file(source).await?;
        }

        Ok(Self::new(target))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for StagedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[async_trait]
impl StagedResource for StagedFile {
    async fn release(&self) -> Result<(), QueueError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "staged file already gone");
                Ok(())
            }
            Err(e) => Err(QueueError::Release {
                resource: self.to_string(),
                source: e,
            }),
        }
    }
}

// ── Release guard ───────────────────────────────────────────────────

/// Releases a resource in the background if dropped while still armed.
///
/// Arm it before an await point that may be abandoned (a dropped request
/// future, an aborted worker) and [`disarm`](Self::disarm) it once the owner
/// has handed the resource on or released it itself.
pub struct ReleaseGuard<R: StagedResource> {
    resource: R,
    stats: Arc<IngestionStats>,
    armed: bool,
}

impl<R: StagedResource> ReleaseGuard<R> {
    pub fn new(resource: R, stats: Arc<IngestionStats>) -> Self {
        Self {
            resource,
            stats,
            armed: true,
        }
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl<R: StagedResource> Drop for ReleaseGuard<R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.stats.record_abandoned();

        let resource = self.resource.clone();
        let stats = self.stats.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(resource = %resource, "owner dropped before release, releasing in the background");
                runtime.spawn(async move {
                    match resource.release().await {
                        Ok(()) => stats.record_released(),
                        Err(e) => {
                            stats.record_release_failure();
                            warn!(resource = %resource, error = %e, "background release failed");
                        }
                    }
                });
            }
            Err(_) => {
                stats.record_release_failure();
                warn!(resource = %resource, "owner dropped outside a runtime, resource left behind");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("courtside-staged-{name}-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn stage_moves_file_under_unique_name() {
        let inbox = scratch_dir("inbox");
        let staging = scratch_dir("staging");
        tokio::fs::create_dir_all(&inbox).await.unwrap();
        let upload = inbox.join("results.csv");
        tokio::fs::write(&upload, b"player,score\n").await.unwrap();

        let staged = StagedFile::stage(&upload, &staging).await.unwrap();

        assert!(!upload.exists(), "source should be moved away");
        assert!(staged.path().starts_with(&staging));
        assert!(staged.to_string().ends_with("results.csv"));
        let contents = tokio::fs::read_to_string(staged.path()).await.unwrap();
        assert_eq!(contents, "player,score\n");

        tokio::fs::remove_dir_all(&inbox).await.ok();
        tokio::fs::remove_dir_all(&staging).await.ok();
    }

    #[tokio::test]
    async fn release_deletes_file() {
        let dir = scratch_dir("release");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("upload.tmp");
        tokio::fs::write(&path, b"x").await.unwrap();

        let staged = StagedFile::new(&path);
        staged.release().await.unwrap();
        assert!(!path.exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn release_of_missing_file_is_ok() {
        let staged = StagedFile::new(scratch_dir("missing").join("nope.tmp"));
        assert!(staged.release().await.is_ok());
    }

    async fn wait_for_release(path: &Path) {
        for _ in 0..200 {
            if !path.exists() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("{} was not released", path.display());
    }

    #[tokio::test]
    async fn dropped_guard_releases_in_background() {
        let dir = scratch_dir("guard");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("orphan.tmp");
        tokio::fs::write(&path, b"x").await.unwrap();
        let stats = Arc::new(IngestionStats::new());

        drop(ReleaseGuard::new(StagedFile::new(&path), stats.clone()));

        wait_for_release(&path).await;
        assert_eq!(stats.snapshot().abandoned, 1);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn disarmed_guard_leaves_resource_alone() {
        let dir = scratch_dir("disarmed");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("kept.tmp");
        tokio::fs::write(&path, b"x").await.unwrap();
        let stats = Arc::new(IngestionStats::new());

        ReleaseGuard::new(StagedFile::new(&path), stats.clone()).disarm();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(path.exists());
        assert_eq!(stats.snapshot().abandoned, 0);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }
}
