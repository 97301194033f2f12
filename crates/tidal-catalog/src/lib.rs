//! # tidal-catalog
//!
//! The versioned root chain and the transaction protocol of the tidal
//! lakehouse catalog.
//!
//! ## Layout in storage
//!
//! ```text
//! {lakehouse}/
//! ├── _latest_hint.txt                       # advisory head version
//! ├── _lakehouse_def_{uuid}.binpb            # lakehouse definition
//! ├── _{64 bits, LSB first}.ipc              # one root node per version
//! └── {4}/{4}/{4}/{8}-{ns}[-{table}]-{uuid}.binpb   # object definitions
//! ```
//!
//! Every version is an immutable root node listing the definition path of
//! each namespace and table. Definitions are never rewritten: altering an
//! object writes a new blob and points the next root at it.
//!
//! ## Modules
//!
//! - [`lakehouse`]: the [`Lakehouse`] facade (create, begin, mutate, commit)
//! - [`chain`]: reading the root chain (latest, by version, by time, history)
//! - [`transaction`]: running and committed transaction state
//! - [`root`] and [`node`]: the root model and its Arrow IPC encoding
//! - [`definitions`]: definition blob I/O
//! - [`metrics`]: commit and chain metrics

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod chain;
pub mod definitions;
pub mod lakehouse;
pub mod metrics;
pub mod node;
pub mod root;
pub mod transaction;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tidal_core::prelude::*;

    pub use crate::chain::{
        find_latest_root, find_root_before_timestamp, find_root_for_version, list_roots,
    };
    pub use crate::lakehouse::Lakehouse;
    pub use crate::root::{Root, RootLocation};
    pub use crate::transaction::{
        CommittedTransaction, IsolationLevel, RunningTransaction, TransactionOptions,
    };
}

pub use lakehouse::Lakehouse;
pub use root::{Root, RootLocation};
pub use transaction::{CommittedTransaction, IsolationLevel, RunningTransaction, TransactionOptions};
