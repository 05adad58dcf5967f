//! File-backed stores: pending suggestions and the shared write discipline.
//!
//! Every persisted artifact is a JSON list rewritten as a whole. A rewrite
//! is one critical section: take an exclusive advisory lock on a sidecar
//! `<file>.lock`, read, mutate, write `<file>.tmp`, fsync, rename over the
//! target. A crash mid-write leaves either the old or the new file, never a
//! torn one.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::suggestion::Suggestion;

/// Errors reading or writing persisted artifacts.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The lock file could not be opened or locked.
    #[error("failed to lock {path}: {source}")]
    Lock {
        /// Locked artifact.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The artifact exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Artifact location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The artifact could not be written or replaced.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Artifact location.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The artifact is not a well-formed list; it is rejected whole.
    #[error("{path} is malformed: {detail}")]
    Malformed {
        /// Artifact location.
        path: PathBuf,
        /// Parser message.
        detail: String,
    },

    /// No pending suggestion at the requested position.
    #[error("no pending suggestion at index {index} (store holds {len})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Number of stored suggestions.
        len: usize,
    },
}

/// Exclusive advisory lock on `<target>.lock`, released on drop.
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Block until the lock for `target` is held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Lock`] if the lock file cannot be created or locked.
    pub fn acquire(target: &Path) -> Result<Self, StoreError> {
        let lock_path = sidecar(target, "lock");
        let lock_err = |source: std::io::Error| StoreError::Lock {
            path: target.to_path_buf(),
            source,
        };
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Read a JSON list. A missing file is an empty list.
///
/// # Errors
///
/// Returns [`StoreError::Read`] on I/O failure and [`StoreError::Malformed`]
/// if the contents are not a list of `T`.
pub fn read_json_list<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&contents).map_err(|e| StoreError::Malformed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Replace `path` with the pretty JSON of `value`, atomically.
///
/// Callers must hold the [`FileLock`] for `path`.
///
/// # Errors
///
/// Returns [`StoreError::Write`] if any step fails; the target is untouched.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let write_err = |source: std::io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    json.push('\n');
    write_bytes_atomic(path, json.as_bytes()).map_err(write_err)
}

/// Write to `<path>.tmp`, fsync, then rename over `path`.
pub(crate) fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = sidecar(path, "tmp");
    let result = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// `dir/name.ext` becomes `dir/name.ext.<suffix>`.
pub(crate) fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Ordered store of suggestions awaiting human review.
///
/// Positions are stable: entries are only ever appended, and approval
/// rewrites an entry in place.
#[derive(Debug, Clone)]
pub struct PendingStore {
    path: PathBuf,
}

impl PendingStore {
    /// Store backed by the JSON file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All suggestions in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the file is unreadable or malformed.
    pub fn list(&self) -> Result<Vec<Suggestion>, StoreError> {
        read_json_list(&self.path)
    }

    /// Append one suggestion. Returns false if it carried no `safer_only`
    /// action and was therefore not queued.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or rewritten.
    pub fn enqueue(&self, suggestion: Suggestion) -> Result<bool, StoreError> {
        Ok(self.enqueue_all(vec![suggestion])? == 1)
    }

    /// Append many suggestions in one critical section. Returns how many
    /// were queued; suggestions without a surviving action are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read or rewritten.
    pub fn enqueue_all(&self, suggestions: Vec<Suggestion>) -> Result<usize, StoreError> {
        let offered = suggestions.len();
        let reviewable: Vec<Suggestion> = suggestions
            .into_iter()
            .filter_map(Suggestion::into_reviewable)
            .collect();
        if reviewable.len() != offered {
            debug!(
                dropped = offered.saturating_sub(reviewable.len()),
                "suggestions without safer_only actions dropped"
            );
        }
        if reviewable.is_empty() {
            return Ok(0);
        }

        let _lock = FileLock::acquire(&self.path)?;
        let mut items: Vec<Suggestion> = read_json_list(&self.path)?;
        let queued = reviewable.len();
        items.extend(reviewable);
        write_json_atomic(&self.path, &items)?;
        debug!(queued, total = items.len(), path = %self.path.display(), "pending store updated");
        Ok(queued)
    }
}
