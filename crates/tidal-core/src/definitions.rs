//! Protobuf definition blobs.
//!
//! Definitions are stored as standalone protobuf files and referenced from
//! the rows of a root node by path. A definition is never rewritten: every
//! change produces a new blob at a new path.
//!
//! Maps use `BTreeMap` so that encoding is deterministic.

use std::collections::BTreeMap;

use bytes::Bytes;
use prost::Message;

use crate::error::{Error, Result};
use crate::keys::KeyLimits;

/// Default maximum namespace name size in bytes.
pub const DEFAULT_NAMESPACE_NAME_MAX_SIZE_BYTES: u32 = 100;
/// Default maximum table name size in bytes.
pub const DEFAULT_TABLE_NAME_MAX_SIZE_BYTES: u32 = 100;
/// Default maximum definition file name size in bytes.
pub const DEFAULT_FILE_NAME_MAX_SIZE_BYTES: u32 = 200;
/// Default maximum encoded root node size in bytes.
pub const DEFAULT_NODE_FILE_MAX_SIZE_BYTES: u64 = 1_048_576;

/// Lakehouse-wide settings, fixed at creation.
#[derive(Clone, PartialEq, Message)]
pub struct LakehouseDef {
    /// Maximum namespace name size in bytes.
    #[prost(uint32, tag = "1")]
    pub namespace_name_max_size_bytes: u32,
    /// Maximum table name size in bytes.
    #[prost(uint32, tag = "2")]
    pub table_name_max_size_bytes: u32,
    /// Maximum definition file name size in bytes.
    #[prost(uint32, tag = "3")]
    pub file_name_max_size_bytes: u32,
    /// Maximum encoded root node size in bytes.
    #[prost(uint64, tag = "4")]
    pub node_file_max_size_bytes: u64,
    /// Free-form properties.
    #[prost(btree_map = "string, string", tag = "5")]
    pub properties: BTreeMap<String, String>,
}

impl LakehouseDef {
    /// Creates a lakehouse definition with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            namespace_name_max_size_bytes: DEFAULT_NAMESPACE_NAME_MAX_SIZE_BYTES,
            table_name_max_size_bytes: DEFAULT_TABLE_NAME_MAX_SIZE_BYTES,
            file_name_max_size_bytes: DEFAULT_FILE_NAME_MAX_SIZE_BYTES,
            node_file_max_size_bytes: DEFAULT_NODE_FILE_MAX_SIZE_BYTES,
            properties: BTreeMap::new(),
        }
    }

    /// Checks that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the first zero limit.
    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("namespace_name_max_size_bytes", u64::from(self.namespace_name_max_size_bytes)),
            ("table_name_max_size_bytes", u64::from(self.table_name_max_size_bytes)),
            ("file_name_max_size_bytes", u64::from(self.file_name_max_size_bytes)),
            ("node_file_max_size_bytes", self.node_file_max_size_bytes),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(Error::invalid_argument(format!(
                    "lakehouse definition {name} must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Returns the key limits derived from this definition.
    #[must_use]
    pub fn key_limits(&self) -> KeyLimits {
        KeyLimits::new(
            self.namespace_name_max_size_bytes as usize,
            self.table_name_max_size_bytes as usize,
        )
    }
}

/// A namespace definition.
#[derive(Clone, PartialEq, Message)]
pub struct NamespaceDef {
    /// Free-form properties.
    #[prost(btree_map = "string, string", tag = "1")]
    pub properties: BTreeMap<String, String>,
}

impl NamespaceDef {
    /// Creates a namespace definition from properties.
    #[must_use]
    pub fn with_properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            properties: properties
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A table column.
#[derive(Clone, PartialEq, Message)]
pub struct Column {
    /// Column name.
    #[prost(string, tag = "1")]
    pub name: String,
    /// Engine-defined type name.
    #[prost(string, tag = "2")]
    pub data_type: String,
    /// Whether the column accepts nulls.
    #[prost(bool, tag = "3")]
    pub nullable: bool,
}

impl Column {
    /// Creates a column.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }
}

/// A table definition.
#[derive(Clone, PartialEq, Message)]
pub struct TableDef {
    /// Ordered columns.
    #[prost(message, repeated, tag = "1")]
    pub columns: Vec<Column>,
    /// Free-form properties.
    #[prost(btree_map = "string, string", tag = "2")]
    pub properties: BTreeMap<String, String>,
    /// Location of the table data, if managed outside the lakehouse root.
    #[prost(string, tag = "3")]
    pub location: String,
}

/// Encodes a definition to protobuf bytes.
#[must_use]
pub fn encode<M: Message>(definition: &M) -> Bytes {
    Bytes::from(definition.encode_to_vec())
}

/// Decodes a definition read from `path`.
///
/// # Errors
///
/// Returns `Corrupted` if the bytes are not a valid message.
pub fn decode<M: Message + Default>(path: &str, data: Bytes) -> Result<M> {
    M::decode(data).map_err(|e| Error::corrupted(path, format!("invalid definition: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lakehouse_defaults() {
        let def = LakehouseDef::new();
        assert_eq!(def.namespace_name_max_size_bytes, 100);
        assert_eq!(def.table_name_max_size_bytes, 100);
        assert_eq!(def.file_name_max_size_bytes, 200);
        assert_eq!(def.node_file_max_size_bytes, 1_048_576);
        assert!(def.validate().is_ok());
        assert_eq!(def.key_limits(), KeyLimits::new(100, 100));
    }

    #[test]
    fn zero_limits_rejected() {
        let def = LakehouseDef {
            table_name_max_size_bytes: 0,
            ..LakehouseDef::new()
        };
        let err = def.validate().unwrap_err();
        assert!(err.to_string().contains("table_name_max_size_bytes"));

        // prost defaults are all zero
        assert!(LakehouseDef::default().validate().is_err());
    }

    #[test]
    fn table_def_survives_encoding() {
        let def = TableDef {
            columns: vec![Column::new("id", "bigint", false), Column::new("name", "string", true)],
            properties: BTreeMap::from([("format".to_string(), "parquet".to_string())]),
            location: String::new(),
        };

        let decoded: TableDef = decode("t.binpb", encode(&def)).unwrap();
        assert_eq!(decoded, def);
    }

    #[test]
    fn garbage_is_corruption() {
        let err = decode::<NamespaceDef>("ns.binpb", Bytes::from_static(&[0xff, 0xff, 0xff]))
            .unwrap_err();
        assert!(matches!(err, Error::Corrupted { ref path, .. } if path == "ns.binpb"));
    }
}
