use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ReelError, Result};

/// Per-run scratch directory.
///
/// Every intermediate file of a run is created through (or registered with)
/// the workspace so [`Workspace::cleanup`] can remove it. Dropping the
/// workspace removes the directory as well.
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    dir: Option<TempDir>,
    tracked: Vec<PathBuf>,
}

impl Workspace {
    /// Open a workspace under the system temp directory.
    pub fn open() -> Result<Self> {
        Self::open_in(&std::env::temp_dir())
    }

    /// Open a workspace under `root`.
    pub fn open_in(root: &Path) -> Result<Self> {
        let id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("peakreel-{id}-"))
            .tempdir_in(root)
            .map_err(|e| {
                ReelError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create workspace in {}: {e}", root.display()),
                ))
            })?;
        let path = dir.path().to_path_buf();
        debug!("Opened workspace {:?}", path);

        Ok(Self {
            id,
            path,
            dir: Some(dir),
            tracked: Vec::new(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tracked(&self) -> &[PathBuf] {
        &self.tracked
    }

    pub fn is_cleaned(&self) -> bool {
        self.dir.is_none()
    }

    /// Register a file created under the workspace.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.tracked.contains(&path) {
            self.tracked.push(path);
        }
    }

    /// Reserve a unique, tracked file path inside the workspace.
    pub fn file_path(&mut self, stem: &str, extension: &str) -> PathBuf {
        let path = self
            .path
            .join(format!("{stem}-{}.{extension}", Uuid::new_v4().simple()));
        self.track(path.clone());
        path
    }

    /// Remove every tracked file and then the directory itself.
    ///
    /// Safe to call repeatedly; files that are already gone are skipped.
    pub fn cleanup(&mut self) -> Result<()> {
        for path in self.tracked.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed {:?}", path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {:?}: {}", path, e),
            }
        }

        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed workspace {:?}", self.path),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ReelError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to remove workspace {}: {e}", self.path.display()),
                    )))
                }
            }
        }

        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.dir.is_some() {
            warn!("Workspace {:?} dropped without cleanup, removing", self.path);
            // TempDir removes the directory tree on drop
        }
    }
}
