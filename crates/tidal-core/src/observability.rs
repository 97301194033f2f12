//! Logging initialization and span helpers.
//!
//! The catalog logs through `tracing`. Binaries and tests call
//! [`init_logging`] once; library code only emits events and spans.

use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; subsequent calls are no-ops. If another
/// global subscriber is already installed, it is left in place.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `tidal_catalog=debug`)
///
/// # Example
///
/// ```rust
/// use tidal_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let result = match format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init(),
        };

        if let Err(e) = result {
            tracing::debug!(error = %e, "global subscriber already installed");
        }
    });
}

/// Creates a span for a transaction-scoped catalog operation.
///
/// # Example
///
/// ```rust
/// use tidal_core::observability::transaction_span;
///
/// let span = transaction_span("commit", "01J0000000000000000000000");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn transaction_span(operation: &str, transaction_id: &str) -> Span {
    tracing::info_span!("transaction", op = operation, transaction_id = transaction_id)
}

/// Creates a span for a read of the root chain.
#[must_use]
pub fn chain_span(operation: &str) -> Span {
    tracing::debug_span!("chain", op = operation)
}
