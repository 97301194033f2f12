//! End-to-end catalog scenarios: create, mutate, commit and time travel.

use std::collections::BTreeMap;
use std::sync::Arc;

use tidal_catalog::chain;
use tidal_catalog::prelude::*;
use tidal_test_utils::{init_test_logging, TracingMemoryBackend};

fn props(pairs: &[(&str, &str)]) -> NamespaceDef {
    NamespaceDef::with_properties(pairs.iter().copied())
}

fn new_lakehouse() -> (Lakehouse, TracingMemoryBackend) {
    let backend = TracingMemoryBackend::new();
    let lakehouse = Lakehouse::new(LakehouseStorage::new(Arc::new(backend.clone())));
    (lakehouse, backend)
}

#[tokio::test]
async fn test_old_snapshot_still_reads_old_definition() -> Result<()> {
    init_test_logging();
    let (lakehouse, _) = new_lakehouse();
    lakehouse.create(&LakehouseDef::new()).await?;

    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    let tx = lakehouse
        .create_namespace(tx, "ns1", &props(&[("k1", "v1")]))
        .await?;
    let v1 = lakehouse.commit(tx).await?;
    assert_eq!(v1.version(), Some(1));

    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    let tx = lakehouse
        .alter_namespace(tx, "ns1", &props(&[("k1", "v2")]))
        .await?;
    let v2 = lakehouse.commit(tx).await?;
    assert_eq!(v2.version(), Some(2));

    let latest = lakehouse.begin(&TransactionOptions::default()).await?;
    let current = lakehouse.describe_namespace(&latest, "ns1").await?;
    assert_eq!(current.properties.get("k1").map(String::as_str), Some("v2"));

    let old = lakehouse
        .begin_at_version(1, &TransactionOptions::default())
        .await?;
    let previous = lakehouse.describe_namespace(&old, "ns1").await?;
    assert_eq!(previous.properties.get("k1").map(String::as_str), Some("v1"));

    // Both definitions are still on storage under different paths.
    let key_path = |root: &Root| root.rows().next().map(|(_, v)| v.clone());
    assert_ne!(key_path(v1.committed_root()), key_path(v2.committed_root()));
    Ok(())
}

#[tokio::test]
async fn test_namespace_and_table_lifecycle() -> Result<()> {
    let (lakehouse, _) = new_lakehouse();
    lakehouse.create(&LakehouseDef::new()).await?;

    let options = TransactionOptions::default();
    let tx = lakehouse.begin(&options).await?;
    let tx = lakehouse.create_namespace(tx, "sales", &props(&[])).await?;
    let tx = lakehouse.create_namespace(tx, "marketing", &props(&[])).await?;
    let orders = TableDef {
        columns: vec![
            Column::new("order_id", "bigint", false),
            Column::new("amount", "decimal(10,2)", true),
        ],
        properties: BTreeMap::from([("format".to_string(), "parquet".to_string())]),
        location: "s3://warehouse/sales/orders".to_string(),
    };
    let tx = lakehouse.create_table(tx, "sales", "orders", &orders).await?;
    let tx = lakehouse
        .create_table(tx, "sales", "customers", &TableDef::default())
        .await?;
    let tx = lakehouse
        .create_table(tx, "marketing", "campaigns", &TableDef::default())
        .await?;
    lakehouse.commit(tx).await?;

    let tx = lakehouse.begin(&options).await?;
    assert_eq!(lakehouse.show_namespaces(&tx).await?, vec!["marketing", "sales"]);
    assert_eq!(
        lakehouse.show_tables(&tx, "sales").await?,
        vec!["customers", "orders"]
    );
    assert_eq!(lakehouse.show_tables(&tx, "marketing").await?, vec!["campaigns"]);
    assert!(lakehouse.table_exists(&tx, "sales", "orders").await?);
    assert!(!lakehouse.table_exists(&tx, "sales", "returns").await?);
    assert_eq!(lakehouse.describe_table(&tx, "sales", "orders").await?, orders);

    let tx = lakehouse.drop_table(tx, "sales", "customers").await?;
    let tx = lakehouse
        .alter_table(tx, "sales", "orders", &TableDef::default())
        .await?;
    let committed = lakehouse.commit(tx).await?;
    assert_eq!(committed.version(), Some(2));

    let tx = lakehouse.begin(&options).await?;
    assert_eq!(lakehouse.show_tables(&tx, "sales").await?, vec!["orders"]);
    assert_eq!(
        lakehouse.describe_table(&tx, "sales", "orders").await?,
        TableDef::default()
    );
    lakehouse.abandon(tx);
    Ok(())
}

#[tokio::test]
async fn test_mutation_errors() -> Result<()> {
    let (lakehouse, _) = new_lakehouse();
    lakehouse.create(&LakehouseDef::new()).await?;

    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    let tx = lakehouse.create_namespace(tx, "ns1", &props(&[])).await?;

    let err = lakehouse
        .create_namespace(tx.clone(), "ns1", &props(&[]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ObjectAlreadyExists { .. }), "{err:?}");

    let err = lakehouse
        .alter_namespace(tx.clone(), "ns2", &props(&[]))
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = lakehouse.drop_table(tx.clone(), "ns1", "t1").await.unwrap_err();
    assert!(err.is_not_found());

    let err = lakehouse
        .create_namespace(tx.clone(), "", &props(&[]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("must be provided"));

    let long = "n".repeat(101);
    let err = lakehouse
        .create_namespace(tx.clone(), &long, &props(&[]))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("less than or equal to 100 bytes"));

    let err = lakehouse
        .create_namespace(tx, "has space", &props(&[]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument { .. }));
    Ok(())
}

#[tokio::test]
async fn test_names_with_path_characters_are_rejected() -> Result<()> {
    let (lakehouse, backend) = new_lakehouse();
    lakehouse.create(&LakehouseDef::new()).await?;
    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    let tx = lakehouse.create_namespace(tx, "ns1", &props(&[])).await?;
    let objects_before = backend.paths().len();

    for name in ["50%off", "a\\b", "a/./b", "a/b"] {
        let err = lakehouse
            .create_namespace(tx.clone(), name, &props(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }), "{name:?}: {err:?}");
        assert!(err.to_string().contains("path character"), "{name:?}: {err}");

        let err = lakehouse
            .create_table(tx.clone(), "ns1", name, &TableDef::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("path character"), "{name:?}: {err}");
    }
    assert_eq!(backend.paths().len(), objects_before);
    Ok(())
}

#[tokio::test]
async fn test_failed_mutation_leaves_transaction_usable() -> Result<()> {
    let (lakehouse, _) = new_lakehouse();
    lakehouse.create(&LakehouseDef::new()).await?;

    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    let tx = lakehouse.create_namespace(tx, "ns1", &props(&[])).await?;
    assert!(lakehouse
        .create_namespace(tx.clone(), "ns1", &props(&[]))
        .await
        .is_err());

    let tx = lakehouse.create_namespace(tx, "ns2", &props(&[])).await?;
    assert_eq!(tx.mutations(), 2);
    lakehouse.commit(tx).await?;
    Ok(())
}

#[tokio::test]
async fn test_abandoned_transaction_writes_no_root() -> Result<()> {
    let (lakehouse, backend) = new_lakehouse();
    lakehouse.create(&LakehouseDef::new()).await?;

    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    let tx = lakehouse.create_namespace(tx, "ns1", &props(&[])).await?;
    lakehouse.abandon(tx);

    assert!(!backend.contains(&root_path(1)));
    assert_eq!(chain::find_latest_root(lakehouse.storage()).await?.version(), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_begin_on_uninitialized_lakehouse() {
    let (lakehouse, _) = new_lakehouse();
    let err = lakehouse
        .begin(&TransactionOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_isolation_level_is_recorded() -> Result<()> {
    let (lakehouse, _) = new_lakehouse();
    lakehouse.create(&LakehouseDef::new()).await?;

    let options = TransactionOptions::default().with_isolation_level(IsolationLevel::Serializable);
    let tx = lakehouse.begin(&options).await?;
    assert_eq!(tx.isolation_level(), IsolationLevel::Serializable);
    assert_eq!(tx.beginning_root().version(), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_local_filesystem_lakehouse() -> Result<()> {
    let dir = tempfile::tempdir().expect("tempdir");
    let backend = ObjectStoreBackend::local(dir.path())?;
    let lakehouse = Lakehouse::new(LakehouseStorage::with_prefix(Arc::new(backend), "lake")?);
    lakehouse.create(&LakehouseDef::new()).await?;

    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    let tx = lakehouse
        .create_namespace(tx, "ns1", &props(&[("k1", "v1")]))
        .await?;
    lakehouse.commit(tx).await?;

    assert!(dir.path().join("lake").join(root_path(1)).exists());
    assert!(dir.path().join("lake").join("_latest_hint.txt").exists());

    let reopened = Lakehouse::new(LakehouseStorage::with_prefix(
        Arc::new(ObjectStoreBackend::local(dir.path())?),
        "lake",
    )?);
    let tx = reopened.begin(&TransactionOptions::default()).await?;
    assert_eq!(tx.beginning_root().version(), Some(1));
    assert_eq!(reopened.show_namespaces(&tx).await?, vec!["ns1"]);
    Ok(())
}
