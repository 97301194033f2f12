//! In-memory model of a root node.
//!
//! A [`Root`] is one snapshot of the catalog: a row table mapping object
//! keys to definition paths plus a few system fields. Persisted roots are
//! immutable; mutations always produce a new unpersisted root via
//! [`Root::clone_for_mutation`] or the copy-on-write row setters.
//!
//! Rows live in an [`im::OrdMap`], so cloning a root shares structure with
//! the original and a namespace's tables can be found with a range scan.

use std::ops::Bound;

use im::OrdMap;
use tidal_core::keys::ObjectKey;

/// Where a persisted root lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootLocation {
    /// Lakehouse-relative root path.
    pub path: String,
    /// Version decoded from the path.
    pub version: u64,
}

/// A snapshot of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    location: Option<RootLocation>,
    created_at_millis: Option<i64>,
    lakehouse_def_path: String,
    previous_root_path: Option<String>,
    rollback_from_root_path: Option<String>,
    rows: OrdMap<ObjectKey, String>,
}

impl Root {
    /// Creates an empty, unpersisted root pointing at a lakehouse definition.
    #[must_use]
    pub fn new(lakehouse_def_path: impl Into<String>) -> Self {
        Self {
            location: None,
            created_at_millis: None,
            lakehouse_def_path: lakehouse_def_path.into(),
            previous_root_path: None,
            rollback_from_root_path: None,
            rows: OrdMap::new(),
        }
    }

    /// Reassembles a root from its decoded parts.
    pub(crate) fn from_parts(
        lakehouse_def_path: String,
        previous_root_path: Option<String>,
        rollback_from_root_path: Option<String>,
        created_at_millis: i64,
        rows: OrdMap<ObjectKey, String>,
    ) -> Self {
        Self {
            location: None,
            created_at_millis: Some(created_at_millis),
            lakehouse_def_path,
            previous_root_path,
            rollback_from_root_path,
            rows,
        }
    }

    /// Marks this root as persisted at `location`.
    pub(crate) fn into_persisted(mut self, location: RootLocation, created_at_millis: i64) -> Self {
        self.location = Some(location);
        self.created_at_millis = Some(created_at_millis);
        self
    }

    pub(crate) fn set_location(&mut self, location: RootLocation) {
        self.location = Some(location);
    }

    pub(crate) fn set_previous_root_path(&mut self, path: impl Into<String>) {
        self.previous_root_path = Some(path.into());
    }

    /// Returns an unpersisted copy with the same rows and lakehouse definition.
    ///
    /// Provenance fields, the creation time and the location are cleared.
    #[must_use]
    pub fn clone_for_mutation(&self) -> Self {
        Self {
            location: None,
            created_at_millis: None,
            lakehouse_def_path: self.lakehouse_def_path.clone(),
            previous_root_path: None,
            rollback_from_root_path: None,
            rows: self.rows.clone(),
        }
    }

    /// Returns a copy with `key` set to `value`. Persisted roots are first
    /// cloned for mutation.
    #[must_use]
    pub fn with_row(&self, key: ObjectKey, value: impl Into<String>) -> Self {
        let mut next = self.mutable_copy();
        next.rows.insert(key, value.into());
        next
    }

    /// Returns a copy without `key`. Persisted roots are first cloned for
    /// mutation.
    #[must_use]
    pub fn without_row(&self, key: &ObjectKey) -> Self {
        let mut next = self.mutable_copy();
        next.rows.remove(key);
        next
    }

    fn mutable_copy(&self) -> Self {
        if self.is_persisted() {
            self.clone_for_mutation()
        } else {
            self.clone()
        }
    }

    // === Accessors ===

    /// Returns true if this root has been written to storage.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.location.is_some()
    }

    /// Returns the storage location of a persisted root.
    #[must_use]
    pub fn location(&self) -> Option<&RootLocation> {
        self.location.as_ref()
    }

    /// Returns the path of a persisted root.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.path.as_str())
    }

    /// Returns the version of a persisted root.
    #[must_use]
    pub fn version(&self) -> Option<u64> {
        self.location.as_ref().map(|l| l.version)
    }

    /// Returns the creation time in epoch milliseconds.
    #[must_use]
    pub fn created_at_millis(&self) -> Option<i64> {
        self.created_at_millis
    }

    /// Returns the path of the lakehouse definition.
    #[must_use]
    pub fn lakehouse_def_path(&self) -> &str {
        &self.lakehouse_def_path
    }

    /// Returns the path of the previous root, absent for version 0.
    #[must_use]
    pub fn previous_root_path(&self) -> Option<&str> {
        self.previous_root_path.as_deref()
    }

    /// Returns the path of the root this version was rolled back from.
    #[must_use]
    pub fn rollback_from_root_path(&self) -> Option<&str> {
        self.rollback_from_root_path.as_deref()
    }

    /// Returns the number of object rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<&str> {
        self.rows.get(key).map(String::as_str)
    }

    /// Returns true if a row exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.rows.contains_key(key)
    }

    /// Iterates over all object rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = (&ObjectKey, &String)> + '_ {
        self.rows.iter()
    }

    /// Iterates over the rows whose key starts with `prefix`, in key order.
    pub fn rows_with_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a ObjectKey, &'a String)> + 'a {
        self.rows
            .range((Bound::Included(ObjectKey::from_raw(prefix)), Bound::Unbounded))
            .take_while(move |(key, _)| key.as_str().starts_with(prefix))
    }
}
