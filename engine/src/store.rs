//! Policy persistence.
//!
//! The store is a whole-document key-value store: `load` returns the full
//! snapshot and `save` overwrites it. There are no partial writes and no
//! transactions; callers serialize read-modify-write themselves.
//!
//! Reads never fail: a missing, empty or corrupt document degrades to an empty
//! [`PolicyDocument`] (logged at `warn` for corruption). Write failures are
//! returned so the engine can report them, but they never reach the command
//! issuer.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;
use thiserror::Error;

use namelock_types::PolicyDocument;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read policy document at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("policy document at {} is corrupt: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode policy document: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write policy document at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("policy store unavailable: {0}")]
    Unavailable(String),
}

pub trait PolicyStore: Send + Sync {
    /// Full current snapshot. Unreadable state is an empty document.
    fn load(&self) -> PolicyDocument;

    /// Replace the persisted snapshot with `document`.
    fn save(&self, document: &PolicyDocument) -> Result<(), StoreError>;
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<PolicyDocument>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_document(document: PolicyDocument) -> Self {
        Self {
            document: Mutex::new(document),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> PolicyDocument {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PolicyStore for MemoryStore {
    fn load(&self) -> PolicyDocument {
        self.snapshot()
    }

    fn save(&self, document: &PolicyDocument) -> Result<(), StoreError> {
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = document.clone();
        Ok(())
    }
}

/// Pretty-printed JSON document on disk, rewritten atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Like [`PolicyStore::load`] but surfaces why a document was unusable.
    pub fn try_load(&self) -> Result<PolicyDocument, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PolicyDocument::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        if raw.trim().is_empty() {
            return Ok(PolicyDocument::new());
        }
        serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }
}

impl PolicyStore for JsonFileStore {
    fn load(&self) -> PolicyDocument {
        match self.try_load() {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Starting from an empty policy document: {e}");
                PolicyDocument::new()
            }
        }
    }

    fn save(&self, document: &PolicyDocument) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(document).map_err(StoreError::Encode)?;
        atomic_write(&self.path, &bytes).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Temp file in the destination directory, fsync, then rename over the target.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;

    if let Err(err) = tmp.persist(path) {
        if !path.exists() {
            return Err(err.error);
        }
        // Windows refuses to rename over an existing file.
        let backup = path.with_extension("bak");
        let _ = std::fs::remove_file(&backup);
        std::fs::rename(path, &backup)?;
        if let Err(retry) = err.file.persist(path) {
            let _ = std::fs::rename(&backup, path);
            return Err(retry.error);
        }
        if let Err(e) = std::fs::remove_file(&backup) {
            tracing::debug!(path = %backup.display(), "Failed to remove backup after save: {e}");
        }
    }
    Ok(())
}
