use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Per-job scratch directory. Removed by `release`, or on drop if a job
/// future is abandoned before it gets there.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub async fn create(parent: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(parent).await?;
        let parent = parent.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix("storyreel-job-")
                .tempdir_in(parent)
        })
        .await
        .map_err(io::Error::other)??;
        debug!(path = %dir.path().display(), "created workspace");
        Ok(Workspace { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Extension-less path for a scene slot; fetchers add the extension.
    pub fn scene_stem(&self, index: usize, slot: &str) -> PathBuf {
        let name = if slot.is_empty() {
            format!("scene_{index}")
        } else {
            format!("scene_{index}_{slot}")
        };
        self.dir.path().join(name)
    }

    /// Removes the directory tree off the async workers.
    pub async fn release(self) {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => debug!(path = %path.display(), "released workspace"),
            Ok(Err(e)) => warn!(path = %path.display(), error = %e, "failed to remove workspace"),
            Err(e) => warn!(path = %path.display(), error = %e, "workspace cleanup task failed"),
        }
    }
}
