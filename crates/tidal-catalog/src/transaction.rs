//! Transaction state.
//!
//! A transaction begins at the persisted chain head, accumulates mutations
//! in a private working root and ends either committed or abandoned. The
//! types here only carry state; the protocol lives in
//! [`Lakehouse`](crate::lakehouse::Lakehouse).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use tidal_core::error::{Error, Result};
use tidal_core::id::TransactionId;

use crate::root::Root;

/// Option key selecting the isolation level.
pub const ISOLATION_LEVEL_OPTION: &str = "isolation_level";

/// Isolation level requested for a transaction.
///
/// Recorded on the transaction. Commits are always checked against the
/// whole chain, so both levels currently behave identically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Reads see the snapshot the transaction began at.
    #[default]
    Snapshot,
    /// Reads and writes are serialized against every other transaction.
    Serializable,
}

impl IsolationLevel {
    /// Returns the option value naming this level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Serializable => "serializable",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" => Ok(Self::Snapshot),
            "serializable" => Ok(Self::Serializable),
            other => Err(Error::invalid_argument(format!(
                "{ISOLATION_LEVEL_OPTION} must be one of: snapshot, serializable (got {other})"
            ))),
        }
    }
}

/// Options accepted when beginning a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Requested isolation level.
    pub isolation_level: IsolationLevel,
}

impl TransactionOptions {
    /// Parses options from string pairs. Unrecognized keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown isolation level.
    pub fn from_map(options: &HashMap<String, String>) -> Result<Self> {
        let isolation_level = options
            .get(ISOLATION_LEVEL_OPTION)
            .map(|value| value.parse())
            .transpose()?
            .unwrap_or_default();
        Ok(Self { isolation_level })
    }

    /// Sets the isolation level.
    #[must_use]
    pub const fn with_isolation_level(mut self, isolation_level: IsolationLevel) -> Self {
        self.isolation_level = isolation_level;
        self
    }
}

/// A transaction in progress.
///
/// Mutations consume the transaction and return its successor; the
/// beginning root never changes.
#[derive(Debug, Clone)]
pub struct RunningTransaction {
    transaction_id: TransactionId,
    began_at_millis: i64,
    isolation_level: IsolationLevel,
    beginning_root: Root,
    running_root: Root,
    mutations: usize,
}

impl RunningTransaction {
    pub(crate) fn begin(
        beginning_root: Root,
        began_at_millis: i64,
        options: &TransactionOptions,
    ) -> Self {
        Self {
            transaction_id: TransactionId::generate(),
            began_at_millis,
            isolation_level: options.isolation_level,
            running_root: beginning_root.clone(),
            beginning_root,
            mutations: 0,
        }
    }

    /// Replaces the working root after one mutation.
    pub(crate) fn with_running_root(self, running_root: Root) -> Self {
        Self {
            running_root,
            mutations: self.mutations + 1,
            ..self
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Returns when the transaction began, in epoch milliseconds.
    #[must_use]
    pub fn began_at_millis(&self) -> i64 {
        self.began_at_millis
    }

    /// Returns the requested isolation level.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Returns the persisted root the transaction began at.
    #[must_use]
    pub fn beginning_root(&self) -> &Root {
        &self.beginning_root
    }

    /// Returns the root reads and mutations operate on.
    #[must_use]
    pub fn running_root(&self) -> &Root {
        &self.running_root
    }

    /// Returns the number of mutations applied so far.
    #[must_use]
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    pub(crate) fn into_running_root(self) -> Root {
        self.running_root
    }
}

/// A successfully committed transaction.
#[derive(Debug, Clone)]
pub struct CommittedTransaction {
    transaction_id: TransactionId,
    committed_root: Root,
}

impl CommittedTransaction {
    pub(crate) fn new(transaction_id: TransactionId, committed_root: Root) -> Self {
        Self {
            transaction_id,
            committed_root,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    /// Returns the root published by the commit.
    #[must_use]
    pub fn committed_root(&self) -> &Root {
        &self.committed_root
    }

    /// Returns the committed version.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.committed_root.version()
    }
}
