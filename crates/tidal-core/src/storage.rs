//! Object storage contract of the catalog.
//!
//! The catalog needs very little from a store: whole-object reads,
//! existence checks, a write that either creates or replaces, batch delete
//! and prefix listing. Keys are flat strings; there are no directories.
//!
//! Create-if-absent ([`WriteMode::CreateNew`]) is the only atomic primitive
//! and the only serialization point between concurrent writers. Backends
//! must guarantee that, of any number of racing `CreateNew` writes to one
//! path, exactly one reports [`WriteOutcome::Written`].

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// How a write treats an object already stored at the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Write only if nothing is stored at the path.
    CreateNew,
    /// Replace whatever is stored at the path.
    Overwrite,
}

/// Outcome of a write that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The data is now stored at the path.
    Written,
    /// A [`WriteMode::CreateNew`] write found an existing object and left it
    /// untouched.
    AlreadyExists,
}

/// Metadata about a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    /// Full key of the object.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time, when the store reports one.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A flat key/value object store.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Reads the whole object.
    ///
    /// Returns `Error::ObjectNotFound` if nothing is stored at `path`.
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// Writes `data` according to `mode`.
    ///
    /// A `CreateNew` write that loses to an existing object is
    /// [`WriteOutcome::AlreadyExists`], not an error.
    async fn put(&self, path: &str, data: Bytes, mode: WriteMode) -> Result<WriteOutcome>;

    /// Deletes an object. Deleting a missing object succeeds.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Deletes a batch of objects.
    ///
    /// Backends with a native bulk delete should override this.
    async fn delete_many(&self, paths: &[String]) -> Result<()> {
        for path in paths {
            self.delete(path).await?;
        }
        Ok(())
    }

    /// Lists every object whose key starts with `prefix`, in any order.
    ///
    /// The prefix is a plain string prefix and may end mid-segment.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;

    /// Returns object metadata, or `None` if nothing is stored at `path`.
    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>>;

    /// Returns true if an object is stored at `path`.
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.head(path).await?.is_some())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    written_at: DateTime<Utc>,
}

/// Process-local backend for tests and ephemeral lakehouses.
///
/// Objects are kept in key order, so listings come back sorted.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    objects: Arc<RwLock<BTreeMap<String, MemoryObject>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error() -> Error {
        Error::Internal {
            message: "memory backend lock poisoned".into(),
        }
    }

    fn meta(path: &str, object: &MemoryObject) -> ObjectMeta {
        ObjectMeta {
            path: path.to_string(),
            size: object.data.len() as u64,
            last_modified: Some(object.written_at),
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let objects = self.objects.read().map_err(|_| Self::lock_error())?;
        objects
            .get(path)
            .map(|object| object.data.clone())
            .ok_or_else(|| Error::not_found("object", path))
    }

    async fn put(&self, path: &str, data: Bytes, mode: WriteMode) -> Result<WriteOutcome> {
        let mut objects = self.objects.write().map_err(|_| Self::lock_error())?;
        if mode == WriteMode::CreateNew && objects.contains_key(path) {
            return Ok(WriteOutcome::AlreadyExists);
        }
        objects.insert(
            path.to_string(),
            MemoryObject {
                data,
                written_at: Utc::now(),
            },
        );
        Ok(WriteOutcome::Written)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.objects
            .write()
            .map_err(|_| Self::lock_error())?
            .remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Self::lock_error())?;
        Ok(objects
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, object)| Self::meta(path, object))
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let objects = self.objects.read().map_err(|_| Self::lock_error())?;
        Ok(objects.get(path).map(|object| Self::meta(path, object)))
    }
}
