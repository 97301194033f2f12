//! Shared test utilities for tidal integration tests.
//!
//! - [`TracingMemoryBackend`]: in-memory storage with operation recording,
//!   failure injection and optional latency
//! - [`init_test_logging`]: test-friendly `tracing` subscriber

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable in tests
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod storage;

pub use storage::*;

/// Initialize test logging (call once per test module).
pub fn init_test_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tidal_catalog=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}
