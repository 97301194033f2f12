//! The lakehouse catalog: initialization, transactions and catalog objects.
//!
//! All state lives in object storage. A transaction begins at the chain head,
//! applies mutations to a private copy-on-write root and publishes it with a
//! single create-if-absent write of the next version:
//!
//! ```text
//! begin ──► create_namespace ──► create_table ──► commit
//!  │          (new blob,           (new blob,        │
//!  │           new working root)    new working root) ▼
//!  └─ reads latest root                   create-if-absent root_path(v + 1)
//!                                          ├─ created   → hint = v + 1
//!                                          └─ exists    → CommitFailure
//! ```
//!
//! There is no lock and no internal retry. A [`Error::CommitFailure`] means
//! another transaction published the version first; the caller restarts from
//! [`Lakehouse::begin`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tidal_catalog::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tidal_core::Result<()> {
//! let lakehouse = Lakehouse::new(LakehouseStorage::new(Arc::new(MemoryBackend::new())));
//! lakehouse.create(&LakehouseDef::new()).await?;
//!
//! let tx = lakehouse.begin(&TransactionOptions::default()).await?;
//! let tx = lakehouse.create_namespace(tx, "sales", &NamespaceDef::default()).await?;
//! let committed = lakehouse.commit(tx).await?;
//! assert_eq!(committed.version(), Some(1));
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use tidal_core::config::CatalogConfig;
use tidal_core::definitions::{LakehouseDef, NamespaceDef, TableDef};
use tidal_core::error::{Error, Result};
use tidal_core::keys::{self, KeyLimits, ObjectKey};
use tidal_core::lakehouse_storage::{CommitOutcome, LakehouseStorage};
use tidal_core::observability::transaction_span;
use tidal_core::paths::{self, root_path, LATEST_HINT_PATH};
use tracing::Instrument;

use crate::chain;
use crate::definitions;
use crate::metrics;
use crate::node;
use crate::root::{Root, RootLocation};
use crate::transaction::{CommittedTransaction, RunningTransaction, TransactionOptions};

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn table_id(namespace: &str, table: &str) -> String {
    format!("{namespace}.{table}")
}

/// A lakehouse catalog over one storage location.
#[derive(Debug, Clone)]
pub struct Lakehouse {
    storage: LakehouseStorage,
}

impl Lakehouse {
    /// Creates a catalog over `storage`.
    #[must_use]
    pub fn new(storage: LakehouseStorage) -> Self {
        Self { storage }
    }

    /// Creates a catalog from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be built or the prefix is
    /// invalid.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let backend = config.storage.build()?;
        let storage = match &config.prefix {
            Some(prefix) => LakehouseStorage::with_prefix(backend, prefix)?,
            None => LakehouseStorage::new(backend),
        };
        Ok(Self::new(storage))
    }

    /// Returns the underlying storage.
    #[must_use]
    pub fn storage(&self) -> &LakehouseStorage {
        &self.storage
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Initializes the lakehouse: writes the definition and version 0.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an invalid definition and
    /// `ObjectAlreadyExists` if the lakehouse is already initialized.
    #[tracing::instrument(skip_all, fields(prefix = ?self.storage.prefix()))]
    pub async fn create(&self, def: &LakehouseDef) -> Result<Root> {
        def.validate()?;

        let path = root_path(0);
        if self.storage.exists(&path).await? {
            return Err(already_initialized());
        }

        let def_path = paths::new_lakehouse_def_path();
        definitions::write_lakehouse_def(&self.storage, &def_path, def).await?;

        let root = Root::new(def_path);
        let created_at = now_millis();
        let data = node::encode(&root, created_at)?;
        check_node_size(&data, def)?;
        if self.storage.commit(&path, data).await? == CommitOutcome::AlreadyExists {
            return Err(already_initialized());
        }

        self.write_hint(0).await;
        tracing::info!(lakehouse_def = root.lakehouse_def_path(), "created lakehouse");
        Ok(root.into_persisted(RootLocation { path, version: 0 }, created_at))
    }

    /// Begins a transaction at the latest committed version.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the lakehouse is not initialized.
    pub async fn begin(&self, options: &TransactionOptions) -> Result<RunningTransaction> {
        let root = chain::find_latest_root(&self.storage).await?;
        Ok(begin_at(root, options))
    }

    /// Begins a transaction at a historical version.
    ///
    /// Reads see that version. Committing fails with `CommitFailure` unless
    /// `version` is still the latest.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the version does not exist.
    pub async fn begin_at_version(
        &self,
        version: u64,
        options: &TransactionOptions,
    ) -> Result<RunningTransaction> {
        let root = chain::find_root_for_version(&self.storage, version).await?;
        Ok(begin_at(root, options))
    }

    /// Publishes the transaction's working root as the next version.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the transaction made no changes or the
    /// node exceeds the configured size, and `CommitFailure` if another
    /// transaction already published the next version.
    pub async fn commit(&self, tx: RunningTransaction) -> Result<CommittedTransaction> {
        let span = transaction_span("commit", &tx.transaction_id().to_string());
        self.commit_running(tx).instrument(span).await
    }

    async fn commit_running(&self, tx: RunningTransaction) -> Result<CommittedTransaction> {
        if tx.running_root().is_persisted() {
            return Err(Error::invalid_argument("nothing to commit"));
        }
        let (beginning_path, beginning_version) = tx
            .beginning_root()
            .location()
            .map(|l| (l.path.clone(), l.version))
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "beginning root of transaction {} is not persisted",
                    tx.transaction_id()
                ))
            })?;
        let version = beginning_version
            .checked_add(1)
            .ok_or_else(|| Error::invalid_argument("no versions left after u64::MAX"))?;

        let def = self.lakehouse_def(tx.running_root()).await?;
        let transaction_id = tx.transaction_id();
        let mutations = tx.mutations();

        let mut root = tx.into_running_root();
        root.set_previous_root_path(beginning_path);
        let created_at = now_millis();
        let data = node::encode(&root, created_at)?;
        check_node_size(&data, &def)?;

        let path = root_path(version);
        if self.storage.commit(&path, data).await? == CommitOutcome::AlreadyExists {
            metrics::record_commit_conflict();
            tracing::warn!(version, "another transaction committed this version first");
            return Err(Error::CommitFailure { version, path });
        }

        self.write_hint(version).await;
        metrics::record_commit(mutations);
        tracing::info!(version, mutations, "committed transaction");

        Ok(CommittedTransaction::new(
            transaction_id,
            root.into_persisted(RootLocation { path, version }, created_at),
        ))
    }

    /// Drops a transaction without publishing it.
    #[allow(clippy::unused_self, clippy::needless_pass_by_value)]
    pub fn abandon(&self, tx: RunningTransaction) {
        tracing::debug!(
            transaction_id = %tx.transaction_id(),
            mutations = tx.mutations(),
            "abandoned transaction"
        );
    }

    async fn write_hint(&self, version: u64) {
        let result = self
            .storage
            .overwrite(LATEST_HINT_PATH, Bytes::from(version.to_string()))
            .await;
        if let Err(error) = result {
            metrics::record_hint_write_failure();
            tracing::warn!(version, %error, "failed to update version hint");
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    async fn lakehouse_def(&self, root: &Root) -> Result<LakehouseDef> {
        definitions::read_lakehouse_def(&self.storage, root.lakehouse_def_path()).await
    }

    async fn key_limits(&self, root: &Root) -> Result<KeyLimits> {
        Ok(self.lakehouse_def(root).await?.key_limits())
    }

    /// Returns the lakehouse definition seen by the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition cannot be read.
    pub async fn describe_lakehouse(&self, tx: &RunningTransaction) -> Result<LakehouseDef> {
        self.lakehouse_def(tx.running_root()).await
    }

    /// Lists namespace names in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lakehouse definition cannot be read.
    pub async fn show_namespaces(&self, tx: &RunningTransaction) -> Result<Vec<String>> {
        let limits = self.key_limits(tx.running_root()).await?;
        // Padding sorts below every byte a name may contain, so key order is name order.
        tx.running_root()
            .rows_with_prefix(keys::NAMESPACE_PREFIX)
            .map(|(key, _)| keys::namespace_name_from_key(key.as_str(), limits))
            .collect()
    }

    /// Returns true if the namespace exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an invalid name.
    pub async fn namespace_exists(&self, tx: &RunningTransaction, namespace: &str) -> Result<bool> {
        let limits = self.key_limits(tx.running_root()).await?;
        Ok(tx.running_root().contains(&keys::namespace_key(namespace, limits)?))
    }

    /// Reads a namespace definition.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the namespace does not exist.
    pub async fn describe_namespace(
        &self,
        tx: &RunningTransaction,
        namespace: &str,
    ) -> Result<NamespaceDef> {
        let limits = self.key_limits(tx.running_root()).await?;
        let key = keys::namespace_key(namespace, limits)?;
        let path = existing_row(tx.running_root(), &key, "namespace", namespace)?;
        definitions::read_namespace_def(&self.storage, path).await
    }

    /// Lists the table names of a namespace in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the namespace does not exist.
    pub async fn show_tables(&self, tx: &RunningTransaction, namespace: &str) -> Result<Vec<String>> {
        let limits = self.key_limits(tx.running_root()).await?;
        require_namespace(tx.running_root(), namespace, limits)?;
        let prefix = keys::table_prefix(namespace, limits)?;
        tx.running_root()
            .rows_with_prefix(&prefix)
            .map(|(key, _)| keys::table_name_from_key(key.as_str(), limits))
            .collect()
    }

    /// Returns true if the table exists.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the namespace does not exist.
    pub async fn table_exists(
        &self,
        tx: &RunningTransaction,
        namespace: &str,
        table: &str,
    ) -> Result<bool> {
        let limits = self.key_limits(tx.running_root()).await?;
        require_namespace(tx.running_root(), namespace, limits)?;
        Ok(tx.running_root().contains(&keys::table_key(namespace, table, limits)?))
    }

    /// Reads a table definition.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the namespace or table does not exist.
    pub async fn describe_table(
        &self,
        tx: &RunningTransaction,
        namespace: &str,
        table: &str,
    ) -> Result<TableDef> {
        let limits = self.key_limits(tx.running_root()).await?;
        require_namespace(tx.running_root(), namespace, limits)?;
        let key = keys::table_key(namespace, table, limits)?;
        let path = existing_row(tx.running_root(), &key, "table", table_id(namespace, table))?;
        definitions::read_table_def(&self.storage, path).await
    }

    // ========================================================================
    // Namespace mutations
    // ========================================================================

    /// Creates a namespace.
    ///
    /// # Errors
    ///
    /// Returns `ObjectAlreadyExists` if the namespace exists and
    /// `InvalidArgument` for an invalid name.
    #[tracing::instrument(skip_all, fields(transaction_id = %tx.transaction_id(), namespace = %namespace))]
    pub async fn create_namespace(
        &self,
        tx: RunningTransaction,
        namespace: &str,
        def: &NamespaceDef,
    ) -> Result<RunningTransaction> {
        let limits = self.key_limits(tx.running_root()).await?;
        let key = keys::namespace_key(namespace, limits)?;
        if tx.running_root().contains(&key) {
            return Err(Error::already_exists("namespace", namespace));
        }

        let path = paths::new_namespace_def_path(namespace);
        definitions::write_namespace_def(&self.storage, &path, def).await?;
        tracing::debug!(path = %path, "created namespace");
        let root = tx.running_root().with_row(key, path);
        Ok(tx.with_running_root(root))
    }

    /// Replaces a namespace definition.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the namespace does not exist.
    #[tracing::instrument(skip_all, fields(transaction_id = %tx.transaction_id(), namespace = %namespace))]
    pub async fn alter_namespace(
        &self,
        tx: RunningTransaction,
        namespace: &str,
        def: &NamespaceDef,
    ) -> Result<RunningTransaction> {
        let limits = self.key_limits(tx.running_root()).await?;
        let key = keys::namespace_key(namespace, limits)?;
        existing_row(tx.running_root(), &key, "namespace", namespace)?;

        let path = paths::new_namespace_def_path(namespace);
        definitions::write_namespace_def(&self.storage, &path, def).await?;
        tracing::debug!(path = %path, "altered namespace");
        let root = tx.running_root().with_row(key, path);
        Ok(tx.with_running_root(root))
    }

    /// Drops an empty namespace.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the namespace does not exist and
    /// `InvalidArgument` if it still has tables.
    #[tracing::instrument(skip_all, fields(transaction_id = %tx.transaction_id(), namespace = %namespace))]
    pub async fn drop_namespace(
        &self,
        tx: RunningTransaction,
        namespace: &str,
    ) -> Result<RunningTransaction> {
        let limits = self.key_limits(tx.running_root()).await?;
        let key = keys::namespace_key(namespace, limits)?;
        existing_row(tx.running_root(), &key, "namespace", namespace)?;

        let prefix = keys::table_prefix(namespace, limits)?;
        if tx.running_root().rows_with_prefix(&prefix).next().is_some() {
            return Err(Error::invalid_argument(format!(
                "namespace {namespace} still contains tables"
            )));
        }

        tracing::debug!("dropped namespace");
        let root = tx.running_root().without_row(&key);
        Ok(tx.with_running_root(root))
    }

    // ========================================================================
    // Table mutations
    // ========================================================================

    /// Creates a table in an existing namespace.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the namespace does not exist and
    /// `ObjectAlreadyExists` if the table exists.
    #[tracing::instrument(skip_all, fields(
        transaction_id = %tx.transaction_id(),
        namespace = %namespace,
        table = %table
    ))]
    pub async fn create_table(
        &self,
        tx: RunningTransaction,
        namespace: &str,
        table: &str,
        def: &TableDef,
    ) -> Result<RunningTransaction> {
        let limits = self.key_limits(tx.running_root()).await?;
        require_namespace(tx.running_root(), namespace, limits)?;
        let key = keys::table_key(namespace, table, limits)?;
        if tx.running_root().contains(&key) {
            return Err(Error::already_exists("table", table_id(namespace, table)));
        }

        let path = paths::new_table_def_path(namespace, table);
        definitions::write_table_def(&self.storage, &path, def).await?;
        tracing::debug!(path = %path, "created table");
        let root = tx.running_root().with_row(key, path);
        Ok(tx.with_running_root(root))
    }

    /// Replaces a table definition.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the namespace or table does not exist.
    #[tracing::instrument(skip_all, fields(
        transaction_id = %tx.transaction_id(),
        namespace = %namespace,
        table = %table
    ))]
    pub async fn alter_table(
        &self,
        tx: RunningTransaction,
        namespace: &str,
        table: &str,
        def: &TableDef,
    ) -> Result<RunningTransaction> {
        let limits = self.key_limits(tx.running_root()).await?;
        require_namespace(tx.running_root(), namespace, limits)?;
        let key = keys::table_key(namespace, table, limits)?;
        existing_row(tx.running_root(), &key, "table", table_id(namespace, table))?;

        let path = paths::new_table_def_path(namespace, table);
        definitions::write_table_def(&self.storage, &path, def).await?;
        tracing::debug!(path = %path, "altered table");
        let root = tx.running_root().with_row(key, path);
        Ok(tx.with_running_root(root))
    }

    /// Drops a table.
    ///
    /// # Errors
    ///
    /// Returns `ObjectNotFound` if the namespace or table does not exist.
    #[tracing::instrument(skip_all, fields(
        transaction_id = %tx.transaction_id(),
        namespace = %namespace,
        table = %table
    ))]
    pub async fn drop_table(
        &self,
        tx: RunningTransaction,
        namespace: &str,
        table: &str,
    ) -> Result<RunningTransaction> {
        let limits = self.key_limits(tx.running_root()).await?;
        require_namespace(tx.running_root(), namespace, limits)?;
        let key = keys::table_key(namespace, table, limits)?;
        existing_row(tx.running_root(), &key, "table", table_id(namespace, table))?;

        tracing::debug!("dropped table");
        let root = tx.running_root().without_row(&key);
        Ok(tx.with_running_root(root))
    }
}

fn begin_at(root: Root, options: &TransactionOptions) -> RunningTransaction {
    let tx = RunningTransaction::begin(root, now_millis(), options);
    tracing::debug!(
        transaction_id = %tx.transaction_id(),
        version = ?tx.beginning_root().version(),
        isolation_level = %tx.isolation_level(),
        "began transaction"
    );
    tx
}

fn already_initialized() -> Error {
    Error::ObjectAlreadyExists {
        message: format!("lakehouse is already initialized: {} exists", root_path(0)),
    }
}

fn existing_row<'a>(
    root: &'a Root,
    key: &ObjectKey,
    kind: &'static str,
    id: impl std::fmt::Display,
) -> Result<&'a str> {
    root.get(key).ok_or_else(|| Error::not_found(kind, id))
}

fn require_namespace(root: &Root, namespace: &str, limits: KeyLimits) -> Result<()> {
    let key = keys::namespace_key(namespace, limits)?;
    existing_row(root, &key, "namespace", namespace).map(|_| ())
}

fn check_node_size(data: &Bytes, def: &LakehouseDef) -> Result<()> {
    let size = u64::try_from(data.len()).unwrap_or(u64::MAX);
    if size > def.node_file_max_size_bytes {
        return Err(Error::invalid_argument(format!(
            "root node of {size} bytes exceeds node_file_max_size_bytes {}",
            def.node_file_max_size_bytes
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tidal_core::definitions::Column;
    use tidal_core::storage::MemoryBackend;

    async fn lakehouse() -> Lakehouse {
        let lakehouse = Lakehouse::new(LakehouseStorage::new(Arc::new(MemoryBackend::new())));
        lakehouse.create(&LakehouseDef::new()).await.unwrap();
        lakehouse
    }

    fn options() -> TransactionOptions {
        TransactionOptions::default()
    }

    #[tokio::test]
    async fn create_twice_is_rejected() {
        let lakehouse = lakehouse().await;
        let err = lakehouse.create(&LakehouseDef::new()).await.unwrap_err();
        assert!(matches!(err, Error::ObjectAlreadyExists { .. }));
    }

    #[tokio::test]
    async fn create_writes_version_zero_and_hint() {
        let lakehouse = Lakehouse::new(LakehouseStorage::new(Arc::new(MemoryBackend::new())));
        let root = lakehouse.create(&LakehouseDef::new()).await.unwrap();
        assert_eq!(root.version(), Some(0));
        assert_eq!(root.previous_root_path(), None);
        assert!(root.lakehouse_def_path().starts_with(paths::LAKEHOUSE_DEF_PREFIX));

        let hint = lakehouse.storage().read(LATEST_HINT_PATH).await.unwrap();
        assert_eq!(&hint[..], b"0");
    }

    #[tokio::test]
    async fn invalid_definition_is_rejected_before_any_write() {
        let lakehouse = Lakehouse::new(LakehouseStorage::new(Arc::new(MemoryBackend::new())));
        let def = LakehouseDef {
            namespace_name_max_size_bytes: 0,
            ..LakehouseDef::new()
        };
        let err = lakehouse.create(&def).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(lakehouse.storage().list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_without_mutations_is_rejected() {
        let lakehouse = lakehouse().await;
        let tx = lakehouse.begin(&options()).await.unwrap();
        let err = lakehouse.commit(tx).await.unwrap_err();
        assert!(err.to_string().contains("nothing to commit"));
    }

    #[tokio::test]
    async fn mutations_do_not_touch_the_beginning_root() {
        let lakehouse = lakehouse().await;
        let tx = lakehouse.begin(&options()).await.unwrap();
        let tx = lakehouse
            .create_namespace(tx, "ns1", &NamespaceDef::default())
            .await
            .unwrap();

        assert_eq!(tx.mutations(), 1);
        assert!(tx.beginning_root().is_persisted());
        assert_eq!(tx.beginning_root().row_count(), 0);
        assert!(!tx.running_root().is_persisted());
        assert!(lakehouse.namespace_exists(&tx, "ns1").await.unwrap());
    }

    #[tokio::test]
    async fn drop_namespace_requires_it_to_be_empty() {
        let lakehouse = lakehouse().await;
        let tx = lakehouse.begin(&options()).await.unwrap();
        let tx = lakehouse
            .create_namespace(tx, "ns1", &NamespaceDef::default())
            .await
            .unwrap();
        let tx = lakehouse
            .create_table(tx, "ns1", "t1", &TableDef::default())
            .await
            .unwrap();

        let err = lakehouse.drop_namespace(tx.clone(), "ns1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));

        let tx = lakehouse.drop_table(tx, "ns1", "t1").await.unwrap();
        let tx = lakehouse.drop_namespace(tx, "ns1").await.unwrap();
        assert!(lakehouse.show_namespaces(&tx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn table_operations_require_the_namespace() {
        let lakehouse = lakehouse().await;
        let tx = lakehouse.begin(&options()).await.unwrap();

        let def = TableDef {
            columns: vec![Column::new("id", "bigint", false)],
            ..TableDef::default()
        };
        let err = lakehouse
            .create_table(tx.clone(), "missing", "t1", &def)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(lakehouse.show_tables(&tx, "missing").await.unwrap_err().is_not_found());
        assert!(lakehouse
            .table_exists(&tx, "missing", "t1")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn oversized_node_is_rejected_at_commit() {
        let lakehouse = Lakehouse::new(LakehouseStorage::new(Arc::new(MemoryBackend::new())));
        let def = LakehouseDef {
            node_file_max_size_bytes: 4_096,
            ..LakehouseDef::new()
        };
        lakehouse.create(&def).await.unwrap();

        let mut tx = lakehouse.begin(&options()).await.unwrap();
        for i in 0..64 {
            tx = lakehouse
                .create_namespace(tx, &format!("namespace_{i:03}"), &NamespaceDef::default())
                .await
                .unwrap();
        }
        let err = lakehouse.commit(tx).await.unwrap_err();
        assert!(err.to_string().contains("node_file_max_size_bytes"), "{err}");
        assert!(!lakehouse.storage().exists(&root_path(1)).await.unwrap());
    }

    #[tokio::test]
    async fn from_config_honours_the_prefix() {
        let config = CatalogConfig {
            prefix: Some("warehouse/lake".to_string()),
            ..CatalogConfig::default()
        };
        let lakehouse = Lakehouse::from_config(&config).unwrap();
        assert_eq!(lakehouse.storage().prefix(), Some("warehouse/lake"));
        lakehouse.create(&LakehouseDef::new()).await.unwrap();
        assert!(lakehouse.storage().exists(&root_path(0)).await.unwrap());
    }
}
