//! [`StorageBackend`] implementation over the `object_store` crate.
//!
//! One backend type covers every production store. The concrete client is
//! chosen at construction time and owned by the backend value:
//!
//! - [`ObjectStoreBackend::local`]: local filesystem rooted at a directory.
//!   Create-if-absent stages the data and publishes it with a no-clobber link.
//! - [`ObjectStoreBackend::s3`]: S3-compatible stores, using a conditional
//!   put (`If-None-Match: *`) for create-if-absent.
//! - [`ObjectStoreBackend::in_memory`]: the `object_store` in-memory store.
//!
//! Prefix listing follows the [`StorageBackend`] contract (plain string
//! prefix), not the `object_store` directory semantics.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::{AmazonS3Builder, S3ConditionalPut};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};

use crate::config::S3Config;
use crate::error::{Error, Result};
use crate::storage::{ObjectMeta, StorageBackend, WriteMode, WriteOutcome};

/// Storage backend that delegates to an [`ObjectStore`] client.
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    /// Wraps an existing `object_store` client.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Creates a backend over a local directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or resolved.
    pub fn local(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| {
            Error::storage_write_with_source(
                format!("create local storage root {}", root.display()),
                e,
            )
        })?;

        let store = LocalFileSystem::new_with_prefix(root).map_err(|e| {
            Error::storage_read_with_source(
                format!("open local storage root {}", root.display()),
                e,
            )
        })?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Creates a backend for an S3-compatible bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built from `config`.
    pub fn s3(config: &S3Config) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http)
            .with_conditional_put(S3ConditionalPut::ETagMatch);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let Some(key_id) = &config.access_key_id {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &config.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        let store = builder.build().map_err(|e| {
            Error::invalid_argument(format!("invalid S3 configuration for bucket {}: {e}", config.bucket))
        })?;
        Ok(Self::new(Arc::new(store)))
    }

    /// Creates a backend over the `object_store` in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    fn meta_from(meta: object_store::ObjectMeta) -> ObjectMeta {
        ObjectMeta {
            path: meta.location.to_string(),
            size: meta.size as u64,
            last_modified: Some(meta.last_modified),
        }
    }

    fn read_error(path: &str, err: object_store::Error) -> Error {
        match err {
            object_store::Error::NotFound { .. } => Error::not_found("object", path),
            other => Error::storage_read_with_source(format!("read {path}"), other),
        }
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn get(&self, path: &str) -> Result<Bytes> {
        let location = ObjectPath::from(path);
        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| Self::read_error(path, e))?;

        result.bytes().await.map_err(|e| Self::read_error(path, e))
    }

    async fn put(&self, path: &str, data: Bytes, mode: WriteMode) -> Result<WriteOutcome> {
        let location = ObjectPath::from(path);
        let opts = PutOptions {
            mode: match mode {
                WriteMode::CreateNew => PutMode::Create,
                WriteMode::Overwrite => PutMode::Overwrite,
            },
            ..PutOptions::default()
        };

        match self
            .store
            .put_opts(&location, PutPayload::from_bytes(data), opts)
            .await
        {
            Ok(_) => Ok(WriteOutcome::Written),
            Err(
                object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. },
            ) if mode == WriteMode::CreateNew => Ok(WriteOutcome::AlreadyExists),
            Err(e) => Err(Error::storage_write_with_source(format!("write {path}"), e)),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let location = ObjectPath::from(path);
        match self.store.delete(&location).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(Error::storage_write_with_source(format!("delete {path}"), e)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>> {
        // object_store lists whole path segments; narrow to the string prefix afterwards.
        let dir = prefix
            .rsplit_once('/')
            .map(|(dir, _)| ObjectPath::from(dir));

        let objects: Vec<object_store::ObjectMeta> = self
            .store
            .list(dir.as_ref())
            .try_collect()
            .await
            .map_err(|e| Error::storage_read_with_source(format!("list {prefix}"), e))?;

        Ok(objects
            .into_iter()
            .filter(|meta| meta.location.as_ref().starts_with(prefix))
            .map(Self::meta_from)
            .collect())
    }

    async fn head(&self, path: &str) -> Result<Option<ObjectMeta>> {
        let location = ObjectPath::from(path);
        match self.store.head(&location).await {
            Ok(meta) => Ok(Some(Self::meta_from(meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(Error::storage_read_with_source(format!("head {path}"), e)),
        }
    }
}
