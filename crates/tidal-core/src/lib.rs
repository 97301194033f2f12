//! # tidal-core
//!
//! Core primitives for the tidal lakehouse catalog.
//!
//! - **Storage**: the object storage contract and its backends (memory,
//!   local filesystem, S3) plus the lakehouse-rooted [`LakehouseStorage`] view
//! - **Paths**: version-addressed root paths and hash-sharded definition paths
//! - **Keys**: fixed-width, byte-comparable object keys
//! - **Definitions**: protobuf definition blobs
//! - **Errors, ids, configuration and logging** shared by every crate
//!
//! The catalog itself (root chain, transactions) lives in `tidal-catalog`.
//!
//! ## Example
//!
//! ```rust
//! use tidal_core::prelude::*;
//!
//! let limits = LakehouseDef::new().key_limits();
//! let key = namespace_key("sales", limits).unwrap();
//! assert!(key.as_str().starts_with("B===sales"));
//!
//! assert_eq!(version_from_root_path(&root_path(42)).unwrap(), 42);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod definitions;
pub mod error;
pub mod id;
pub mod keys;
pub mod lakehouse_storage;
pub mod object_store_backend;
pub mod observability;
pub mod paths;
pub mod storage;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use tidal_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{CatalogConfig, S3Config, StorageConfig};
    pub use crate::definitions::{Column, LakehouseDef, NamespaceDef, TableDef};
    pub use crate::error::{Error, Result};
    pub use crate::id::TransactionId;
    pub use crate::keys::{namespace_key, table_key, KeyKind, KeyLimits, ObjectKey};
    pub use crate::lakehouse_storage::{CommitOutcome, LakehouseStorage};
    pub use crate::object_store_backend::ObjectStoreBackend;
    pub use crate::paths::{root_path, version_from_root_path};
    pub use crate::storage::{
        MemoryBackend, ObjectMeta, StorageBackend, WriteMode, WriteOutcome,
    };
}

// Re-export key types at crate root for ergonomics
pub use config::{CatalogConfig, S3Config, StorageConfig};
pub use definitions::{Column, LakehouseDef, NamespaceDef, TableDef};
pub use error::{Error, Result};
pub use id::TransactionId;
pub use keys::{KeyKind, KeyLimits, ObjectKey};
pub use lakehouse_storage::{CommitOutcome, LakehouseStorage};
pub use object_store_backend::ObjectStoreBackend;
pub use observability::{init_logging, LogFormat};
pub use storage::{MemoryBackend, ObjectMeta, StorageBackend, WriteMode, WriteOutcome};
