//! Fixed-width object keys for the rows of a root node.
//!
//! Every catalog object is addressed by a key made of a 4-byte discriminant
//! followed by its name components, each right-padded with spaces to the
//! maximum size configured in the lakehouse definition:
//!
//! | Kind      | Layout                                     |
//! |-----------|--------------------------------------------|
//! | Namespace | `B===` + namespace (padded)                |
//! | Table     | `C===` + namespace (padded) + table (padded) |
//! | View      | `D===` (reserved)                          |
//!
//! Fixed widths make keys byte-comparable: all tables of one namespace share
//! the prefix returned by [`table_prefix`], so they can be found with a range
//! scan over an ordered row table.
//!
//! Rows that describe the root itself use the short tokens in
//! [`SYSTEM_KEYS`]; none of them starts with a discriminant.

use std::fmt;

use crate::error::{Error, Result};

/// Row key of the lakehouse definition path.
pub const LAKEHOUSE_DEF_KEY: &str = "lakehouse_def";
/// Row key of the previous root path.
pub const PREVIOUS_ROOT_KEY: &str = "previous_root";
/// Row key of the root this version was rolled back from.
pub const ROLLBACK_FROM_ROOT_KEY: &str = "rollback_from_root";
/// Row key of the creation timestamp in epoch milliseconds.
pub const CREATED_AT_MILLIS_KEY: &str = "created_at_millis";
/// Row key of the number of object rows.
pub const N_KEYS_KEY: &str = "n_keys";

/// All system-internal row keys.
pub const SYSTEM_KEYS: [&str; 5] = [
    LAKEHOUSE_DEF_KEY,
    PREVIOUS_ROOT_KEY,
    ROLLBACK_FROM_ROOT_KEY,
    CREATED_AT_MILLIS_KEY,
    N_KEYS_KEY,
];

/// Discriminant of namespace keys.
pub const NAMESPACE_PREFIX: &str = "B===";
/// Discriminant of table keys.
pub const TABLE_PREFIX: &str = "C===";
/// Discriminant reserved for view keys.
pub const VIEW_PREFIX: &str = "D===";
const PREFIX_LEN: usize = 4;
const PADDING: char = ' ';

/// Maximum name sizes, in bytes, taken from the lakehouse definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLimits {
    /// Maximum namespace name size in bytes.
    pub namespace_name_max_bytes: usize,
    /// Maximum table name size in bytes.
    pub table_name_max_bytes: usize,
}

impl KeyLimits {
    /// Creates key limits.
    #[must_use]
    pub const fn new(namespace_name_max_bytes: usize, table_name_max_bytes: usize) -> Self {
        Self {
            namespace_name_max_bytes,
            table_name_max_bytes,
        }
    }

    const fn namespace_key_len(&self) -> usize {
        PREFIX_LEN + self.namespace_name_max_bytes
    }

    const fn table_key_len(&self) -> usize {
        PREFIX_LEN + self.namespace_name_max_bytes + self.table_name_max_bytes
    }
}

/// An encoded row key.
///
/// Ordering is byte-wise, which is the order rows are stored in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Wraps an already encoded key, e.g. one read back from a root node.
    #[must_use]
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns the encoded string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl AsRef<str> for ObjectKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Kind of a row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// A namespace key.
    Namespace,
    /// A table key.
    Table,
    /// A view key. Views are reserved and never written.
    View,
    /// One of [`SYSTEM_KEYS`].
    System,
    /// Anything else.
    Unknown,
}

impl KeyKind {
    /// Classifies `key` under `limits`.
    #[must_use]
    pub fn of(key: &str, limits: KeyLimits) -> Self {
        if is_namespace_key(key, limits) {
            Self::Namespace
        } else if is_table_key(key, limits) {
            Self::Table
        } else if key.starts_with(VIEW_PREFIX) {
            Self::View
        } else if is_system_key(key) {
            Self::System
        } else {
            Self::Unknown
        }
    }
}

/// Returns true for the system-internal row keys.
#[must_use]
pub fn is_system_key(key: &str) -> bool {
    SYSTEM_KEYS.contains(&key)
}

/// Returns true if `key` starts with a namespace, table, or view discriminant.
///
/// Unlike [`KeyKind::of`] this needs no limits, so it can classify rows
/// before the lakehouse definition has been read.
#[must_use]
pub fn has_object_prefix(key: &str) -> bool {
    [NAMESPACE_PREFIX, TABLE_PREFIX, VIEW_PREFIX]
        .iter()
        .any(|prefix| key.starts_with(prefix))
}

// ============================================================================
// Encoding
// ============================================================================

/// Validates a namespace, table, or view name.
///
/// Names must be non-empty, fit in `max_bytes`, and contain no ASCII control
/// characters, spaces, or DEL. Spaces are the key padding, so a name with
/// trailing spaces could not be decoded back.
///
/// Names also become part of definition file names, so the path characters
/// `/`, `\` and `%` are rejected.
///
/// # Errors
///
/// Returns `InvalidArgument` describing the first violated rule.
pub fn validate_name(kind: &str, name: &str, max_bytes: usize) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_argument(format!("{kind} name must be provided")));
    }
    if name.len() > max_bytes {
        return Err(Error::invalid_argument(format!(
            "{kind} name {name} must be less than or equal to {max_bytes} bytes in lakehouse definition"
        )));
    }
    if let Some(c) = name.chars().find(|c| c.is_ascii_control() || *c == ' ') {
        return Err(Error::invalid_argument(format!(
            "{kind} name {name:?} contains reserved character {c:?}"
        )));
    }
    if let Some(c) = name.chars().find(|c| PATH_CHARACTERS.contains(c)) {
        return Err(Error::invalid_argument(format!(
            "{kind} name {name:?} contains path character {c:?}"
        )));
    }
    Ok(())
}

const PATH_CHARACTERS: [char; 3] = ['/', '\\', '%'];

fn push_padded(key: &mut String, name: &str, width: usize) {
    key.push_str(name);
    key.extend(std::iter::repeat(PADDING).take(width - name.len()));
}

/// Encodes the key of a namespace.
///
/// ```rust
/// use tidal_core::keys::{namespace_key, KeyLimits};
///
/// let key = namespace_key("ns1", KeyLimits::new(8, 8)).unwrap();
/// assert_eq!(key.as_str(), "B===ns1     ");
/// ```
///
/// # Errors
///
/// Returns `InvalidArgument` if the name is empty, too long, or contains a
/// reserved character.
pub fn namespace_key(namespace: &str, limits: KeyLimits) -> Result<ObjectKey> {
    validate_name("namespace", namespace, limits.namespace_name_max_bytes)?;

    let mut key = String::with_capacity(limits.namespace_key_len());
    key.push_str(NAMESPACE_PREFIX);
    push_padded(&mut key, namespace, limits.namespace_name_max_bytes);
    Ok(ObjectKey(key))
}

/// Encodes the key of a table.
///
/// # Errors
///
/// Returns `InvalidArgument` if either name is empty, too long, or contains
/// a reserved character.
pub fn table_key(namespace: &str, table: &str, limits: KeyLimits) -> Result<ObjectKey> {
    let mut key = table_prefix(namespace, limits)?;
    validate_name("table", table, limits.table_name_max_bytes)?;
    push_padded(&mut key, table, limits.table_name_max_bytes);
    Ok(ObjectKey(key))
}

/// Returns the key prefix shared by every table of `namespace`.
///
/// # Errors
///
/// Returns `InvalidArgument` if the namespace name is invalid.
pub fn table_prefix(namespace: &str, limits: KeyLimits) -> Result<String> {
    validate_name("namespace", namespace, limits.namespace_name_max_bytes)?;

    let mut key = String::with_capacity(limits.table_key_len());
    key.push_str(TABLE_PREFIX);
    push_padded(&mut key, namespace, limits.namespace_name_max_bytes);
    Ok(key)
}

// ============================================================================
// Decoding
// ============================================================================

/// Returns true if `key` is a namespace key under `limits`.
#[must_use]
pub fn is_namespace_key(key: &str, limits: KeyLimits) -> bool {
    key.starts_with(NAMESPACE_PREFIX) && key.len() == limits.namespace_key_len()
}

/// Returns true if `key` is a table key under `limits`.
#[must_use]
pub fn is_table_key(key: &str, limits: KeyLimits) -> bool {
    key.starts_with(TABLE_PREFIX) && key.len() == limits.table_key_len()
}

fn unpad(key: &str, start: usize, end: usize) -> Option<&str> {
    key.get(start..end).map(|s| s.trim_end_matches(PADDING))
}

/// Decodes the namespace name from a namespace key.
///
/// # Errors
///
/// Returns `InvalidArgument` if `key` is not a namespace key.
pub fn namespace_name_from_key(key: &str, limits: KeyLimits) -> Result<String> {
    if !is_namespace_key(key, limits) {
        return Err(Error::invalid_argument(format!("Invalid namespace key: {key:?}")));
    }
    unpad(key, PREFIX_LEN, key.len())
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_argument(format!("Invalid namespace key: {key:?}")))
}

/// Decodes the namespace component of a table key.
///
/// # Errors
///
/// Returns `InvalidArgument` if `key` is not a table key.
pub fn table_namespace_from_key(key: &str, limits: KeyLimits) -> Result<String> {
    if !is_table_key(key, limits) {
        return Err(Error::invalid_argument(format!("Invalid table key: {key:?}")));
    }
    unpad(key, PREFIX_LEN, PREFIX_LEN + limits.namespace_name_max_bytes)
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_argument(format!("Invalid table key: {key:?}")))
}

/// Decodes the table name from a table key.
///
/// # Errors
///
/// Returns `InvalidArgument` if `key` is not a table key.
pub fn table_name_from_key(key: &str, limits: KeyLimits) -> Result<String> {
    if !is_table_key(key, limits) {
        return Err(Error::invalid_argument(format!("Invalid table key: {key:?}")));
    }
    unpad(key, PREFIX_LEN + limits.namespace_name_max_bytes, key.len())
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_argument(format!("Invalid table key: {key:?}")))
}
