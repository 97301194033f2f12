//! Catalog metrics.
//!
//! Counters for commits, conflicts and the cost of locating the chain head.
//! They complement the structured logs emitted by the same code paths.

use metrics::{counter, describe_counter, describe_histogram, histogram};

// ============================================================================
// Commit Metrics
// ============================================================================

/// Successful commits counter.
pub const COMMITS: &str = "tidal_commits_total";

/// Commits rejected because the target version already existed.
pub const COMMIT_CONFLICTS: &str = "tidal_commit_conflicts_total";

/// Number of mutations folded into one commit.
pub const COMMIT_MUTATIONS: &str = "tidal_commit_mutations";

// ============================================================================
// Chain Metrics
// ============================================================================

/// Existence probes issued while locating the latest root.
pub const ROOT_PROBES: &str = "tidal_root_probes_total";

/// Hint reads that fell back to version 0.
pub const HINT_FALLBACKS: &str = "tidal_hint_fallbacks_total";

/// Hint writes that failed after a successful commit.
pub const HINT_WRITE_FAILURES: &str = "tidal_hint_write_failures_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all catalog metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(COMMITS, "Total committed transactions");
    describe_counter!(COMMIT_CONFLICTS, "Total commits that lost the race for their version");
    describe_histogram!(COMMIT_MUTATIONS, "Mutations per committed transaction");
    describe_counter!(ROOT_PROBES, "Total existence probes while locating the latest root");
    describe_counter!(HINT_FALLBACKS, "Total hint reads that fell back to version 0");
    describe_counter!(HINT_WRITE_FAILURES, "Total failed hint writes after commit");
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records a successful commit.
#[allow(clippy::cast_precision_loss)]
pub fn record_commit(mutations: usize) {
    counter!(COMMITS).increment(1);
    histogram!(COMMIT_MUTATIONS).record(mutations as f64);
}

/// Records a commit conflict.
pub fn record_commit_conflict() {
    counter!(COMMIT_CONFLICTS).increment(1);
}

/// Records root existence probes.
pub fn record_root_probes(probes: u64) {
    counter!(ROOT_PROBES).increment(probes);
}

/// Records a hint fallback, labelled by why the hint was unusable.
pub fn record_hint_fallback(reason: &'static str) {
    counter!(HINT_FALLBACKS, "reason" => reason).increment(1);
}

/// Records a failed hint write.
pub fn record_hint_write_failure() {
    counter!(HINT_WRITE_FAILURES).increment(1);
}
