//! Optimistic concurrency: racing transactions begun at the same version.

use std::sync::Arc;
use std::time::Duration;

use tidal_catalog::chain;
use tidal_catalog::prelude::*;
use tidal_test_utils::{StorageOp, TracingMemoryBackend};

async fn create(backend: &TracingMemoryBackend) -> Lakehouse {
    let lakehouse = Lakehouse::new(LakehouseStorage::new(Arc::new(backend.clone())));
    lakehouse
        .create(&LakehouseDef::new())
        .await
        .expect("create lakehouse");
    lakehouse
}

async fn with_namespace(lakehouse: &Lakehouse, name: &str) -> Result<RunningTransaction> {
    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    lakehouse
        .create_namespace(tx, name, &NamespaceDef::default())
        .await
}

#[tokio::test]
async fn test_exactly_one_of_two_racing_commits_wins() -> Result<()> {
    let backend = TracingMemoryBackend::with_latency(Duration::from_millis(5));
    let lakehouse = create(&backend).await;

    let a = with_namespace(&lakehouse, "alpha").await?;
    let b = with_namespace(&lakehouse, "beta").await?;
    assert_eq!(a.beginning_root().version(), b.beginning_root().version());

    let (ra, rb) = tokio::join!(lakehouse.commit(a), lakehouse.commit(b));
    let (winner, loser) = match (ra, rb) {
        (Ok(w), Err(l)) | (Err(l), Ok(w)) => (w, l),
        (ra, rb) => panic!("expected exactly one winner, got {ra:?} and {rb:?}"),
    };

    assert_eq!(winner.version(), Some(1));
    assert!(loser.is_retryable());
    match &loser {
        Error::CommitFailure { version, path } => {
            assert_eq!(*version, 1);
            assert_eq!(path, &root_path(1));
        }
        other => panic!("expected CommitFailure, got {other:?}"),
    }

    // Both commits attempted the version-1 root; the store kept only one.
    let root_writes = backend.count_ops(|op| {
        matches!(op, StorageOp::Put { path, mode: WriteMode::CreateNew, .. }
            if path == &root_path(1))
    });
    assert_eq!(root_writes, 2);
    assert_eq!(
        chain::find_latest_root(lakehouse.storage()).await?.version(),
        Some(1)
    );
    Ok(())
}

#[tokio::test]
async fn test_loser_retries_from_begin() -> Result<()> {
    let backend = TracingMemoryBackend::new();
    let lakehouse = create(&backend).await;

    let first = with_namespace(&lakehouse, "alpha").await?;
    let second = with_namespace(&lakehouse, "beta").await?;
    lakehouse.commit(first).await?;

    let err = lakehouse.commit(second).await.unwrap_err();
    assert!(err.is_retryable());

    // The loser's view is gone; it redoes its work on top of the winner.
    let retry = with_namespace(&lakehouse, "beta").await?;
    assert_eq!(retry.beginning_root().version(), Some(1));
    let committed = lakehouse.commit(retry).await?;
    assert_eq!(committed.version(), Some(2));

    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    assert_eq!(lakehouse.show_namespaces(&tx).await?, vec!["alpha", "beta"]);
    Ok(())
}

#[tokio::test]
async fn test_stale_historical_transaction_cannot_commit() -> Result<()> {
    let backend = TracingMemoryBackend::new();
    let lakehouse = create(&backend).await;
    lakehouse
        .commit(with_namespace(&lakehouse, "alpha").await?)
        .await?;

    let tx = lakehouse
        .begin_at_version(0, &TransactionOptions::default())
        .await?;
    let tx = lakehouse
        .create_namespace(tx, "beta", &NamespaceDef::default())
        .await?;
    let err = lakehouse.commit(tx).await.unwrap_err();
    assert!(matches!(err, Error::CommitFailure { version: 1, .. }));
    Ok(())
}

#[tokio::test]
async fn test_many_writers_produce_a_gapless_chain() -> Result<()> {
    let backend = TracingMemoryBackend::with_latency(Duration::from_millis(1));
    let lakehouse = create(&backend).await;

    let mut handles = Vec::new();
    for writer in 0..4 {
        let lakehouse = lakehouse.clone();
        handles.push(tokio::spawn(async move {
            let mut committed = 0;
            for round in 0..3 {
                loop {
                    let name = format!("w{writer}_r{round}");
                    let tx = with_namespace(&lakehouse, &name).await?;
                    match lakehouse.commit(tx).await {
                        Ok(_) => break,
                        Err(e) if e.is_retryable() => continue,
                        Err(e) => return Err(e),
                    }
                }
                committed += 1;
            }
            Ok::<_, Error>(committed)
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.expect("writer task")?;
    }
    assert_eq!(total, 12);

    assert_eq!(chain::verify_chain(lakehouse.storage()).await?, 13);
    let tx = lakehouse.begin(&TransactionOptions::default()).await?;
    assert_eq!(lakehouse.show_namespaces(&tx).await?.len(), 12);
    Ok(())
}
