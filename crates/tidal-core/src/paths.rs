//! Storage path layout for a lakehouse.
//!
//! All paths are relative to the lakehouse root:
//!
//! ```text
//! _latest_hint.txt                                  decimal version hint
//! _lakehouse_def_{uuid}.binpb                       lakehouse definition
//! _{64 bits of version, LSB first}.ipc              root node for a version
//! {4}/{4}/{4}/{8}-{ns}-{uuid}.binpb                 namespace definition
//! {4}/{4}/{4}/{8}-{ns}-{table}-{uuid}.binpb         table definition
//! ```
//!
//! Root paths write the version bits least-significant first so that
//! consecutive versions land far apart in the key space of the object store.
//! Definition paths get the same scattering from a 20-bit hash prefix split
//! into directories.

use uuid::Uuid;
use xxhash_rust::xxh32::xxh32;

use crate::error::{Error, Result};

/// Path of the best-effort latest version hint.
pub const LATEST_HINT_PATH: &str = "_latest_hint.txt";

/// File name prefix of lakehouse definition blobs.
pub const LAKEHOUSE_DEF_PREFIX: &str = "_lakehouse_def_";

/// Suffix of protobuf-encoded definition blobs.
pub const DEFINITION_SUFFIX: &str = ".binpb";

/// Suffix of root node files.
pub const ROOT_FILE_SUFFIX: &str = ".ipc";

/// Total length of a root node path: marker, 64 bits and suffix.
pub const ROOT_PATH_LEN: usize = 1 + VERSION_BITS + ROOT_FILE_SUFFIX.len();

const ROOT_MARKER: char = '_';
const VERSION_BITS: usize = 64;

const HASH_BITS: u32 = 20;
const HASH_DIR_WIDTH: usize = 4;
const HASH_DIR_DEPTH: usize = 3;

// ============================================================================
// Root paths
// ============================================================================

/// Returns the root node path for `version`.
///
/// ```rust
/// use tidal_core::paths::root_path;
///
/// assert_eq!(
///     root_path(1),
///     "_1000000000000000000000000000000000000000000000000000000000000000.ipc"
/// );
/// ```
#[must_use]
pub fn root_path(version: u64) -> String {
    let mut path = String::with_capacity(ROOT_PATH_LEN);
    path.push(ROOT_MARKER);
    path.extend(format!("{version:064b}").chars().rev());
    path.push_str(ROOT_FILE_SUFFIX);
    path
}

/// Returns true if `path` is a root node path (`^_[01]{64}\.ipc$`).
#[must_use]
pub fn is_root_path(path: &str) -> bool {
    path.len() == ROOT_PATH_LEN
        && path.starts_with(ROOT_MARKER)
        && path.ends_with(ROOT_FILE_SUFFIX)
        && path.as_bytes()[1..=VERSION_BITS]
            .iter()
            .all(|b| matches!(b, b'0' | b'1'))
}

/// Decodes the version from a root node path.
///
/// # Errors
///
/// Returns `InvalidArgument` if `path` is not a root node path.
pub fn version_from_root_path(path: &str) -> Result<u64> {
    if !is_root_path(path) {
        return Err(Error::invalid_argument(format!(
            "root path must match pattern ^_[01]{{64}}\\.ipc$, got {path:?}"
        )));
    }

    let bits: String = path[1..=VERSION_BITS].chars().rev().collect();
    u64::from_str_radix(&bits, 2)
        .map_err(|e| Error::invalid_argument(format!("invalid root path {path:?}: {e}")))
}

/// Parses the contents of the latest version hint.
///
/// # Errors
///
/// Returns `InvalidArgument` if the text is not a non-negative decimal version.
pub fn parse_hint(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    trimmed
        .parse::<u64>()
        .map_err(|e| Error::invalid_argument(format!("invalid version hint {trimmed:?}: {e}")))
}

// ============================================================================
// Definition paths
// ============================================================================

/// Returns a fresh lakehouse definition path.
#[must_use]
pub fn new_lakehouse_def_path() -> String {
    format!("{LAKEHOUSE_DEF_PREFIX}{}{DEFINITION_SUFFIX}", Uuid::new_v4())
}

/// Returns a fresh namespace definition path.
#[must_use]
pub fn new_namespace_def_path(namespace: &str) -> String {
    let id = Uuid::new_v4().to_string();
    new_definition_path(&[namespace, &id], DEFINITION_SUFFIX)
}

/// Returns a fresh table definition path.
#[must_use]
pub fn new_table_def_path(namespace: &str, table: &str) -> String {
    let id = Uuid::new_v4().to_string();
    new_definition_path(&[namespace, table, &id], DEFINITION_SUFFIX)
}

/// Builds a hash-sharded path for a definition file.
///
/// The parts are joined with `-` and the suffix appended. The low 20 bits of
/// the 32-bit hash of that name become `{4}/{4}/{4}/{8}`, followed by `-` and
/// the name itself.
///
/// ```rust
/// use tidal_core::paths::new_definition_path;
///
/// let path = new_definition_path(&["ns1", "t1", "abc"], ".binpb");
/// assert!(path.ends_with("-ns1-t1-abc.binpb"));
/// assert_eq!(path.split('/').count(), 4);
/// ```
#[must_use]
pub fn new_definition_path(parts: &[&str], suffix: &str) -> String {
    let name = format!("{}{suffix}", parts.join("-"));
    format!("{}-{name}", hash_dirs(&name))
}

fn hash_dirs(name: &str) -> String {
    let hash = xxh32(name.as_bytes(), 0) & ((1 << HASH_BITS) - 1);
    let bits = format!("{hash:0width$b}", width = HASH_BITS as usize);

    let split = HASH_DIR_WIDTH * HASH_DIR_DEPTH;
    let mut dirs = String::with_capacity(bits.len() + HASH_DIR_DEPTH);
    for start in (0..split).step_by(HASH_DIR_WIDTH) {
        dirs.push_str(&bits[start..start + HASH_DIR_WIDTH]);
        dirs.push('/');
    }
    dirs.push_str(&bits[split..]);
    dirs
}
