//! Filesystem hand-off of extracted hash material between stages.

use crate::error::ArtifactError;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::NamedTempFile;

/// Stores artifacts produced by one stage for the next.
pub trait ArtifactStore: Send + Sync {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), ArtifactError>;

    fn exists(&self, path: &Path) -> bool;

    /// Remove a stale artifact. Missing files are not an error.
    fn remove(&self, path: &Path) -> Result<(), ArtifactError>;
}

/// Artifact store writing real files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsArtifactStore;

impl ArtifactStore for FsArtifactStore {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), ArtifactError> {
        let io_err = |source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or_else(|| ArtifactError::NoParent {
                path: path.to_path_buf(),
            })?;
        fs::create_dir_all(dir).map_err(io_err)?;

        // Atomic write: the consumer never sees a partial hash file.
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(data).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn remove(&self, path: &Path) -> Result<(), ArtifactError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ArtifactError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// In-memory artifact store (testing and dry runs).
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    drop_writes: bool,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that accepts writes but never materializes them.
    pub fn discarding() -> Self {
        Self {
            drop_writes: true,
            ..Self::default()
        }
    }

    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(path).cloned()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.into(), data.into());
        }
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn write(&self, path: &Path, data: &[u8]) -> Result<(), ArtifactError> {
        if !self.drop_writes {
            self.insert(path, data);
        }
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files
            .lock()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    fn remove(&self, path: &Path) -> Result<(), ArtifactError> {
        if let Ok(mut files) = self.files.lock() {
            files.remove(path);
        }
        Ok(())
    }
}
