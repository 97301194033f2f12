//! Reading and writing definition blobs.
//!
//! Writes are create-if-absent: definition paths are freshly allocated, so an
//! existing object at the target means two writers picked the same path and
//! is reported as a storage error rather than silently overwritten.

use prost::Message;
use tidal_core::definitions::{self, LakehouseDef, NamespaceDef, TableDef};
use tidal_core::error::{Error, Result};
use tidal_core::lakehouse_storage::{CommitOutcome, LakehouseStorage};

async fn write<M: Message>(storage: &LakehouseStorage, path: &str, definition: &M) -> Result<()> {
    match storage.commit(path, definitions::encode(definition)).await? {
        CommitOutcome::Committed => {
            tracing::debug!(path, "wrote definition");
            Ok(())
        }
        CommitOutcome::AlreadyExists => Err(Error::storage_write(format!(
            "definition file {path} already exists"
        ))),
    }
}

async fn read<M: Message + Default>(storage: &LakehouseStorage, path: &str) -> Result<M> {
    let data = storage.read(path).await?;
    definitions::decode(path, data)
}

/// Writes a lakehouse definition to `path`.
///
/// # Errors
///
/// Returns `StorageWrite` if the path is taken or the write fails.
pub async fn write_lakehouse_def(
    storage: &LakehouseStorage,
    path: &str,
    def: &LakehouseDef,
) -> Result<()> {
    write(storage, path, def).await
}

/// Reads the lakehouse definition at `path`.
///
/// # Errors
///
/// Returns `ObjectNotFound` if missing and `Corrupted` if undecodable or
/// invalid.
pub async fn read_lakehouse_def(storage: &LakehouseStorage, path: &str) -> Result<LakehouseDef> {
    let def: LakehouseDef = read(storage, path).await?;
    def.validate()
        .map_err(|e| Error::corrupted(path, format!("invalid lakehouse definition: {e}")))?;
    Ok(def)
}

/// Writes a namespace definition to `path`.
///
/// # Errors
///
/// Returns `StorageWrite` if the path is taken or the write fails.
pub async fn write_namespace_def(
    storage: &LakehouseStorage,
    path: &str,
    def: &NamespaceDef,
) -> Result<()> {
    write(storage, path, def).await
}

/// Reads the namespace definition at `path`.
///
/// # Errors
///
/// Returns `ObjectNotFound` if missing and `Corrupted` if undecodable.
pub async fn read_namespace_def(storage: &LakehouseStorage, path: &str) -> Result<NamespaceDef> {
    read(storage, path).await
}

/// Writes a table definition to `path`.
///
/// # Errors
///
/// Returns `StorageWrite` if the path is taken or the write fails.
pub async fn write_table_def(storage: &LakehouseStorage, path: &str, def: &TableDef) -> Result<()> {
    write(storage, path, def).await
}

/// Reads the table definition at `path`.
///
/// # Errors
///
/// Returns `ObjectNotFound` if missing and `Corrupted` if undecodable.
pub async fn read_table_def(storage: &LakehouseStorage, path: &str) -> Result<TableDef> {
    read(storage, path).await
}
