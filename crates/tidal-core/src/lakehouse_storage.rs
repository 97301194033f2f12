//! Lakehouse-rooted view over a storage backend.
//!
//! All catalog I/O goes through [`LakehouseStorage`]. It resolves
//! lakehouse-relative paths against an optional key prefix and exposes the
//! handful of primitives the catalog needs:
//!
//! - `commit`: atomic create-if-absent, the only serialization point
//! - `overwrite`: last writer wins, used for the version hint only
//! - whole-object and seekable reads
//! - batch delete and prefix listing
//!
//! # Security
//!
//! Relative paths are validated before use: absolute paths, backslashes,
//! percent-encoding, control characters and `.`/`..` segments are rejected.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::storage::{ObjectMeta, StorageBackend, WriteMode, WriteOutcome};

/// Outcome of a create-if-absent write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The object was created.
    Committed,
    /// An object already exists at the path; nothing was written.
    AlreadyExists,
}

/// Storage scoped to one lakehouse.
#[derive(Clone)]
pub struct LakehouseStorage {
    backend: Arc<dyn StorageBackend>,
    prefix: Option<String>,
}

impl std::fmt::Debug for LakehouseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LakehouseStorage")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl LakehouseStorage {
    /// Creates storage rooted at the top of `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            prefix: None,
        }
    }

    /// Creates storage rooted under `prefix` within `backend`.
    ///
    /// Leading and trailing slashes are ignored; an empty prefix is the
    /// backend root.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the prefix contains traversal sequences.
    pub fn with_prefix(backend: Arc<dyn StorageBackend>, prefix: &str) -> Result<Self> {
        let trimmed = prefix.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::new(backend));
        }
        Self::validate_path(trimmed)?;
        Ok(Self {
            backend,
            prefix: Some(trimmed.to_string()),
        })
    }

    /// Returns the key prefix, if any.
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Returns the backend for advanced operations.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    fn validate_path(path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(Error::invalid_argument("path must be provided"));
        }

        if path.starts_with('/') {
            return Err(Error::invalid_argument(format!(
                "absolute paths not allowed: {path}"
            )));
        }

        if path.contains('\\') {
            return Err(Error::invalid_argument(format!(
                "backslashes not allowed in paths: {path}"
            )));
        }

        if path.contains('%') {
            return Err(Error::invalid_argument(format!(
                "percent-encoding not allowed in paths: {path}"
            )));
        }

        if path.chars().any(char::is_control) {
            return Err(Error::invalid_argument(format!(
                "control characters not allowed in paths: {path:?}"
            )));
        }

        if path.split('/').any(|segment| segment == "." || segment == "..") {
            return Err(Error::invalid_argument(format!(
                "path traversal not allowed: {path}"
            )));
        }

        Ok(())
    }

    fn full_path(&self, path: &str) -> Result<String> {
        Self::validate_path(path)?;
        Ok(match &self.prefix {
            Some(prefix) => format!("{prefix}/{path}"),
            None => path.to_string(),
        })
    }

    // === Reads ===

    /// Returns true if an object exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the backend fails.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.backend.exists(&self.full_path(path)?).await
    }

    /// Reads the whole object at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if there is no object at `path`.
    pub async fn read(&self, path: &str) -> Result<Bytes> {
        self.backend.get(&self.full_path(path)?).await
    }

    /// Reads the object at `path` into a seekable in-memory buffer.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if there is no object at `path`.
    pub async fn read_local(&self, path: &str) -> Result<Cursor<Bytes>> {
        Ok(Cursor::new(self.read(path).await?))
    }

    /// Returns metadata for the object at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the backend fails.
    pub async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        self.backend.head(&self.full_path(path)?).await
    }

    /// Lists lakehouse-relative paths starting with `prefix`, sorted.
    ///
    /// An empty prefix lists the whole lakehouse.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix is invalid or the backend fails.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let (full_prefix, strip) = match &self.prefix {
            Some(root) if prefix.is_empty() => (format!("{root}/"), format!("{root}/")),
            Some(root) => {
                Self::validate_path(prefix)?;
                (format!("{root}/{prefix}"), format!("{root}/"))
            }
            None if prefix.is_empty() => (String::new(), String::new()),
            None => {
                Self::validate_path(prefix)?;
                (prefix.to_string(), String::new())
            }
        };

        let mut paths: Vec<String> = self
            .backend
            .list(&full_prefix)
            .await?
            .into_iter()
            .filter_map(|meta| meta.path.strip_prefix(&strip).map(str::to_string))
            .collect();
        paths.sort();
        Ok(paths)
    }

    // === Writes ===

    /// Atomically creates the object at `path` if nothing exists there.
    ///
    /// An existing object is reported as [`CommitOutcome::AlreadyExists`],
    /// never as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the backend fails.
    pub async fn commit(&self, path: &str, data: Bytes) -> Result<CommitOutcome> {
        let full = self.full_path(path)?;
        match self.backend.put(&full, data, WriteMode::CreateNew).await? {
            WriteOutcome::Written => Ok(CommitOutcome::Committed),
            WriteOutcome::AlreadyExists => Ok(CommitOutcome::AlreadyExists),
        }
    }

    /// Writes the object at `path` unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or the backend fails.
    pub async fn overwrite(&self, path: &str, data: Bytes) -> Result<()> {
        let full = self.full_path(path)?;
        match self.backend.put(&full, data, WriteMode::Overwrite).await? {
            WriteOutcome::Written => Ok(()),
            WriteOutcome::AlreadyExists => Err(Error::storage_write(format!(
                "overwrite of {path} was reported as already existing"
            ))),
        }
    }

    /// Deletes a batch of objects. Missing objects are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if any path is invalid or the backend fails.
    pub async fn delete(&self, paths: &[String]) -> Result<()> {
        let full: Vec<String> = paths
            .iter()
            .map(|path| self.full_path(path))
            .collect::<Result<_>>()?;
        self.backend.delete_many(&full).await
    }
}
