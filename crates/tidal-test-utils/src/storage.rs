//! Test storage with operation tracing and failure injection.
//!
//! [`TracingMemoryBackend`] behaves like the in-memory backend but records
//! every call, so tests can assert how many probes a chain read needed or
//! that a commit wrote exactly one root.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tidal_core::error::{Error, Result};
use tidal_core::storage::{ObjectMeta, StorageBackend, WriteMode, WriteOutcome};

/// Record of a storage operation for test assertions.
#[derive(Debug, Clone)]
pub enum StorageOp {
    /// Whole-object read.
    Get {
        /// Path that was read.
        path: String,
    },
    /// Metadata read, which is how existence probes reach storage.
    Head {
        /// Path that was checked.
        path: String,
    },
    /// Write.
    Put {
        /// Path that was written.
        path: String,
        /// Size of data written.
        size: usize,
        /// Create-if-absent or overwrite.
        mode: WriteMode,
    },
    /// Delete.
    Delete {
        /// Path that was deleted.
        path: String,
    },
    /// Prefix listing.
    List {
        /// Prefix that was listed.
        prefix: String,
    },
}

impl StorageOp {
    /// Returns the path or prefix the operation touched.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Get { path }
            | Self::Head { path }
            | Self::Put { path, .. }
            | Self::Delete { path } => path,
            Self::List { prefix } => prefix,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureScope {
    All,
    Writes,
}

/// In-memory storage backend with operation tracing.
#[derive(Debug, Clone, Default)]
pub struct TracingMemoryBackend {
    data: Arc<Mutex<BTreeMap<String, StoredObject>>>,
    operations: Arc<Mutex<Vec<StorageOp>>>,
    failures: Arc<Mutex<Vec<(String, FailureScope)>>>,
    latency: Option<Duration>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn meta(&self, path: &str) -> ObjectMeta {
        ObjectMeta {
            path: path.to_string(),
            size: self.data.len() as u64,
            last_modified: Some(self.last_modified),
        }
    }
}

impl TracingMemoryBackend {
    /// Creates a new empty tracing storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates storage that sleeps before every operation.
    ///
    /// Widens the window between a transaction's begin and commit so that
    /// concurrent writers actually interleave.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StorageOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Counts recorded operations matching `predicate`.
    pub fn count_ops(&self, predicate: impl Fn(&StorageOp) -> bool) -> usize {
        self.operations
            .lock()
            .expect("lock")
            .iter()
            .filter(|op| predicate(op))
            .count()
    }

    /// Counts existence probes whose path satisfies `predicate`.
    pub fn head_count(&self, predicate: impl Fn(&str) -> bool) -> usize {
        self.count_ops(|op| matches!(op, StorageOp::Head { path } if predicate(path)))
    }

    /// Counts writes to exactly `path`.
    pub fn put_count(&self, path: &str) -> usize {
        self.count_ops(|op| matches!(op, StorageOp::Put { path: p, .. } if p == path))
    }

    /// Fails every operation on paths starting with `prefix`.
    pub fn inject_failure(&self, prefix: impl Into<String>) {
        self.failures
            .lock()
            .expect("lock")
            .push((prefix.into(), FailureScope::All));
    }

    /// Fails writes and deletes on paths starting with `prefix`; reads still work.
    pub fn inject_write_failure(&self, prefix: impl Into<String>) {
        self.failures
            .lock()
            .expect("lock")
            .push((prefix.into(), FailureScope::Writes));
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        self.failures.lock().expect("lock").clear();
    }

    /// Returns true if an object is stored at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.data.lock().expect("lock").contains_key(path)
    }

    /// Returns all stored paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.data.lock().expect("lock").keys().cloned().collect()
    }

    /// Replaces the bytes stored at `path` without recording an operation.
    ///
    /// Used to simulate corruption or out-of-band edits.
    pub fn tamper(&self, path: &str, data: Bytes) {
        self.data.lock().expect("lock").insert(
            path.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
    }

    fn record(&self, op: StorageOp) {
        self.operations.lock().expect("lock").push(op);
    }

    fn check_failure(&self, path: &str, is_write: bool) -> Result<()> {
        let failures = self.failures.lock().expect("lock");
        let hit = failures.iter().any(|(prefix, scope)| {
            path.starts_with(prefix.as_str()) && (*scope == FailureScope::All || is_write)
        });
        if hit {
            let message = format!("injected failure for path: {path}");
            return Err(if is_write {
                Error::storage_write(message)
            } else {
                Error::storage_read(message)
            });
        }
        Ok(())
    }

    async fn maybe_delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn not_found(path: &str) -> Error {
        Error::not_found("object", path)
    }
}

#[async_trait::async_trait]
impl StorageBackend for TracingMemoryBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        self.maybe_delay().await;
        self.check_failure(path, false)?;
        self.record(StorageOp::Get {
            path: path.to_string(),
        });

        let data = self.data.lock().expect("lock");
        data.get(path)
            .map(|o| o.data.clone())
            .ok_or_else(|| Self::not_found(path))
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        self.maybe_delay().await;
        self.check_failure(path, false)?;
        self.record(StorageOp::Head {
            path: path.to_string(),
        });

        let data = self.data.lock().expect("lock");
        Ok(data.get(path).map(|o| o.meta(path)))
    }

    async fn put(&self, path: &str, data: Bytes, mode: WriteMode) -> Result<WriteOutcome> {
        self.maybe_delay().await;
        self.check_failure(path, true)?;
        self.record(StorageOp::Put {
            path: path.to_string(),
            size: data.len(),
            mode,
        });

        let mut store = self.data.lock().expect("lock");
        if mode == WriteMode::CreateNew && store.contains_key(path) {
            return Ok(WriteOutcome::AlreadyExists);
        }
        store.insert(
            path.to_string(),
            StoredObject {
                data,
                last_modified: Utc::now(),
            },
        );
        Ok(WriteOutcome::Written)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.maybe_delay().await;
        self.check_failure(path, true)?;
        self.record(StorageOp::Delete {
            path: path.to_string(),
        });

        self.data.lock().expect("lock").remove(path);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        self.maybe_delay().await;
        self.check_failure(prefix, false)?;
        self.record(StorageOp::List {
            prefix: prefix.to_string(),
        });

        let data = self.data.lock().expect("lock");
        Ok(data
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| v.meta(k))
            .collect())
    }
}
