//! Read-side algorithms over the root chain.
//!
//! Every committed version `v` lives at [`root_path(v)`](root_path) and
//! points back at `v - 1` through its `previous_root` row. The chain head is
//! located by probing forward from the version recorded in
//! `_latest_hint.txt`; the hint is advisory and only affects how many probes
//! a lookup costs.

use futures::stream::{self, BoxStream, StreamExt};
use tidal_core::error::{Error, Result};
use tidal_core::lakehouse_storage::LakehouseStorage;
use tidal_core::observability::chain_span;
use tidal_core::paths::{parse_hint, root_path, version_from_root_path, LATEST_HINT_PATH};
use tracing::Instrument;

use crate::metrics;
use crate::node;
use crate::root::{Root, RootLocation};

fn not_initialized() -> Error {
    Error::ObjectNotFound {
        message: format!("lakehouse is not initialized: {} does not exist", root_path(0)),
    }
}

/// Reads the root committed as `version`.
///
/// # Errors
///
/// Returns `ObjectNotFound` if the version was never committed and
/// `Corrupted` if the node cannot be decoded.
pub async fn read_root(storage: &LakehouseStorage, version: u64) -> Result<Root> {
    read_root_at(storage, &root_path(version)).await
}

/// Reads the root stored at `path`.
///
/// # Errors
///
/// Returns `InvalidArgument` if `path` is not a root path, `ObjectNotFound`
/// if nothing is stored there and `Corrupted` if the node cannot be decoded.
pub async fn read_root_at(storage: &LakehouseStorage, path: &str) -> Result<Root> {
    let version = version_from_root_path(path)?;
    let reader = storage.read_local(path).await?;
    let mut root = node::decode(path, reader)?;
    root.set_location(RootLocation {
        path: path.to_string(),
        version,
    });
    Ok(root)
}

/// Reads the hinted head version, falling back to 0 when the hint is unusable.
async fn read_hint(storage: &LakehouseStorage) -> u64 {
    let data = match storage.read(LATEST_HINT_PATH).await {
        Ok(data) => data,
        Err(error) if error.is_not_found() => {
            tracing::debug!("no version hint, probing from version 0");
            metrics::record_hint_fallback("missing");
            return 0;
        }
        Err(error) => {
            tracing::warn!(%error, "failed to read version hint, probing from version 0");
            metrics::record_hint_fallback("unreadable");
            return 0;
        }
    };

    match std::str::from_utf8(&data)
        .map_err(|e| Error::invalid_argument(format!("version hint is not UTF-8: {e}")))
        .and_then(parse_hint)
    {
        Ok(version) => version,
        Err(error) => {
            tracing::warn!(%error, "ignoring unparsable version hint");
            metrics::record_hint_fallback("unparsable");
            0
        }
    }
}

/// Returns the newest committed version.
///
/// # Errors
///
/// Returns `ObjectNotFound` if the lakehouse has no version 0 and a storage
/// error if a probe fails.
pub async fn find_latest_version(storage: &LakehouseStorage) -> Result<u64> {
    probe_latest(storage)
        .instrument(chain_span("find_latest_version"))
        .await
}

async fn probe_latest(storage: &LakehouseStorage) -> Result<u64> {
    let hint = read_hint(storage).await;
    let mut probes = 1_u64;
    let mut latest = hint;

    if !storage.exists(&root_path(hint)).await? {
        if hint == 0 {
            metrics::record_root_probes(probes);
            return Err(not_initialized());
        }
        tracing::warn!(hint, "hinted root does not exist, probing from version 0");
        metrics::record_hint_fallback("stale");
        probes += 1;
        if !storage.exists(&root_path(0)).await? {
            metrics::record_root_probes(probes);
            return Err(not_initialized());
        }
        latest = 0;
    }

    while let Some(candidate) = latest.checked_add(1) {
        probes += 1;
        if !storage.exists(&root_path(candidate)).await? {
            break;
        }
        latest = candidate;
    }

    metrics::record_root_probes(probes);
    tracing::debug!(hint, latest, probes, "located latest root");
    Ok(latest)
}

/// Returns the newest committed root.
///
/// # Errors
///
/// See [`find_latest_version`] and [`read_root`].
pub async fn find_latest_root(storage: &LakehouseStorage) -> Result<Root> {
    let version = find_latest_version(storage).await?;
    read_root(storage, version).await
}

/// Returns the persisted location of `root`.
fn location(root: &Root) -> Result<(&str, u64)> {
    root.location()
        .map(|l| (l.path.as_str(), l.version))
        .ok_or_else(|| Error::invalid_argument("root has not been persisted"))
}

/// Outcome of following a root's `previous_root` pointer.
enum Previous {
    Root(Root),
    /// Version 0 has no predecessor.
    Start,
    /// The pointer is missing, malformed or leads nowhere.
    Broken { path: String, reason: String },
}

impl Previous {
    fn broken(path: &str, reason: impl Into<String>) -> Self {
        Self::Broken {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

async fn read_previous(storage: &LakehouseStorage, root: &Root) -> Result<Previous> {
    let (path, version) = location(root)?;
    let previous = match (version, root.previous_root_path()) {
        (0, None) => return Ok(Previous::Start),
        (0, Some(previous)) => {
            return Ok(Previous::broken(
                path,
                format!("version 0 points at previous root {previous}"),
            ))
        }
        (_, None) => return Ok(Previous::broken(path, "missing previous root pointer")),
        (_, Some(previous)) => previous,
    };

    let previous_version = match version_from_root_path(previous) {
        Ok(previous_version) => previous_version,
        Err(e) => {
            return Ok(Previous::broken(
                path,
                format!("invalid previous root pointer: {e}"),
            ))
        }
    };
    if previous_version.checked_add(1) != Some(version) {
        return Ok(Previous::broken(
            path,
            format!("version {version} points at version {previous_version}"),
        ));
    }

    match read_root_at(storage, previous).await {
        Ok(root) => Ok(Previous::Root(root)),
        Err(e) if e.is_not_found() => Ok(Previous::broken(
            path,
            format!("previous root {previous} does not exist"),
        )),
        Err(e) => Err(e),
    }
}

/// Returns the root committed as `version` by walking back from the head.
///
/// # Errors
///
/// Returns `ObjectNotFound` if `version` is newer than the head or the chain
/// breaks before reaching it.
pub async fn find_root_for_version(storage: &LakehouseStorage, version: u64) -> Result<Root> {
    let mut root = find_latest_root(storage).await?;
    loop {
        let (_, current) = location(&root)?;
        if current == version {
            return Ok(root);
        }
        if current < version {
            return Err(Error::not_found("version", version));
        }
        let previous = read_previous(storage, &root).await?;
        root = match previous {
            Previous::Root(previous) => previous,
            Previous::Start => return Err(Error::not_found("version", version)),
            Previous::Broken { path, reason } => {
                tracing::warn!(%path, %reason, version, "root chain is broken");
                return Err(Error::ObjectNotFound {
                    message: format!(
                        "version {version} is unreachable: chain breaks at {path}: {reason}"
                    ),
                });
            }
        };
    }
}

/// Returns the newest root created at or before `timestamp_millis`.
///
/// # Errors
///
/// Returns `ObjectNotFound` if every reachable root is newer than the
/// timestamp.
pub async fn find_root_before_timestamp(
    storage: &LakehouseStorage,
    timestamp_millis: i64,
) -> Result<Root> {
    let mut root = find_latest_root(storage).await?;
    loop {
        if root.created_at_millis().is_some_and(|created| created <= timestamp_millis) {
            return Ok(root);
        }
        let previous = read_previous(storage, &root).await?;
        root = match previous {
            Previous::Root(previous) => previous,
            Previous::Start => {
                return Err(Error::ObjectNotFound {
                    message: format!("no root was created at or before {timestamp_millis}"),
                })
            }
            Previous::Broken { path, reason } => {
                tracing::warn!(%path, %reason, timestamp_millis, "root chain is broken");
                return Err(Error::ObjectNotFound {
                    message: format!(
                        "no reachable root was created at or before {timestamp_millis}: \
                         chain breaks at {path}: {reason}"
                    ),
                });
            }
        };
    }
}

enum ListState {
    Head,
    After(Root),
}

async fn next_root(
    storage: LakehouseStorage,
    state: ListState,
) -> Result<Option<(Root, ListState)>> {
    let next = match state {
        ListState::Head => find_latest_root(&storage).await?,
        ListState::After(root) => match read_previous(&storage, &root).await? {
            Previous::Root(previous) => previous,
            Previous::Start => return Ok(None),
            Previous::Broken { path, reason } => return Err(Error::corrupted(path, reason)),
        },
    };
    Ok(Some((next.clone(), ListState::After(next))))
}

/// Streams every root, newest first, ending with version 0.
///
/// The stream is lazy: each item costs one root read, and the head is only
/// located when the first item is polled. Calling this again restarts from
/// the current head. A broken link ends the stream with `Corrupted`.
#[must_use]
pub fn list_roots(storage: &LakehouseStorage) -> BoxStream<'static, Result<Root>> {
    let storage = storage.clone();
    stream::try_unfold(ListState::Head, move |state| {
        next_root(storage.clone(), state).instrument(chain_span("list_roots"))
    })
    .boxed()
}

/// Walks the whole chain and checks its structure.
///
/// Every hop must decrease the version by exactly one and the walk must end
/// at version 0.
///
/// # Errors
///
/// Returns `Corrupted` describing the first broken link.
pub async fn verify_chain(storage: &LakehouseStorage) -> Result<u64> {
    let mut roots = list_roots(storage);
    let mut count = 0_u64;
    while let Some(root) = roots.next().await {
        root?;
        count += 1;
    }
    tracing::debug!(roots = count, "verified root chain");
    Ok(count)
}
