//! Content-addressed upload store.
//!
//! Uploaded bytes are stored under [`ArtifactName`]: a pure function of the
//! content and the lowercase extension. Identical uploads map to the same
//! object and are written at most once per observed absence.
//!
//! `put` is check-then-write without a lock. Two concurrent puts of identical
//! content may both see the object missing and both write it; the bytes are
//! identical, so the collision is harmless. Backends replace objects
//! atomically so a reader never observes a half-written file.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use tracing::debug;
use uuid::Uuid;

use visionq_core::{ArtifactName, DomainError};

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidName(#[from] DomainError),

    #[error("artifact storage io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact storage lock poisoned")]
    Poisoned,
}

/// Byte storage addressed by canonical artifact names.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, name: &ArtifactName) -> Result<bool, ArtifactError>;

    /// Store `content` under `name`, replacing any existing object.
    fn write(&self, name: &ArtifactName, content: &[u8]) -> Result<(), ArtifactError>;

    fn read(&self, name: &ArtifactName) -> Result<Vec<u8>, ArtifactError>;
}

/// Artifacts as files in one directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Open (and create if needed) the storage directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ArtifactError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| ArtifactError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn path_of(&self, name: &ArtifactName) -> PathBuf {
        self.root.join(name.as_str())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, name: &ArtifactName) -> Result<bool, ArtifactError> {
        let path = self.path_of(name);
        path.try_exists()
            .map_err(|source| ArtifactError::Io { path, source })
    }

    fn write(&self, name: &ArtifactName, content: &[u8]) -> Result<(), ArtifactError> {
        let path = self.path_of(name);
        // Write beside the target, then rename over it.
        let tmp = self.root.join(format!(".{}.{}.tmp", name, Uuid::now_v7().simple()));

        fs::write(&tmp, content).map_err(|source| ArtifactError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp);
            ArtifactError::Io {
                path: path.clone(),
                source,
            }
        })
    }

    fn read(&self, name: &ArtifactName) -> Result<Vec<u8>, ArtifactError> {
        let path = self.path_of(name);
        fs::read(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ArtifactError::NotFound(name.to_string()),
            _ => ArtifactError::Io { path, source },
        })
    }
}

/// In-memory artifact store for tests/dev.
///
/// Counts physical writes so deduplication can be asserted.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    objects: RwLock<HashMap<ArtifactName, Vec<u8>>>,
    writes: AtomicUsize,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write` calls performed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn exists(&self, name: &ArtifactName) -> Result<bool, ArtifactError> {
        let objects = self.objects.read().map_err(|_| ArtifactError::Poisoned)?;
        Ok(objects.contains_key(name))
    }

    fn write(&self, name: &ArtifactName, content: &[u8]) -> Result<(), ArtifactError> {
        let mut objects = self.objects.write().map_err(|_| ArtifactError::Poisoned)?;
        objects.insert(name.clone(), content.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self, name: &ArtifactName) -> Result<Vec<u8>, ArtifactError> {
        let objects = self.objects.read().map_err(|_| ArtifactError::Poisoned)?;
        objects
            .get(name)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(name.to_string()))
    }
}

/// Front door to artifact storage: naming, dedup and resolution.
#[derive(Clone)]
pub struct UploadStore {
    backend: Arc<dyn ArtifactStore>,
}

impl UploadStore {
    pub fn new(backend: Arc<dyn ArtifactStore>) -> Self {
        Self { backend }
    }

    /// Store `content` uploaded as `filename` and return its canonical name.
    ///
    /// Writes only when no object of that name exists; the name is returned
    /// either way.
    pub fn put(&self, filename: &str, content: &[u8]) -> Result<ArtifactName, ArtifactError> {
        let name = ArtifactName::for_content(filename, content);

        if self.backend.exists(&name)? {
            debug!(artifact = %name, filename, "artifact already stored");
        } else {
            self.backend.write(&name, content)?;
            debug!(artifact = %name, filename, bytes = content.len(), "artifact stored");
        }

        Ok(name)
    }

    /// Fetch the bytes behind a canonical name received from a peer.
    pub fn resolve(&self, image_name: &str) -> Result<Vec<u8>, ArtifactError> {
        let name = ArtifactName::parse(image_name)?;
        self.backend.read(&name)
    }
}

impl core::fmt::Debug for UploadStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UploadStore").finish_non_exhaustive()
    }
}
