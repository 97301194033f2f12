//! Root node file codec.
//!
//! A root node is an Arrow IPC file with two non-null UTF-8 columns, `key`
//! and `value`. System rows come first, followed by the object rows in key
//! order:
//!
//! ```text
//! key                 value
//! lakehouse_def       _lakehouse_def_{uuid}.binpb
//! previous_root       _{64 bits}.ipc           (absent for version 0)
//! rollback_from_root  _{64 bits}.ipc           (optional)
//! created_at_millis   1718000000000
//! n_keys              2
//! B===ns1 ...         {4}/{4}/{4}/{8}-ns1-{uuid}.binpb
//! C===ns1 ...t1 ...   {4}/{4}/{4}/{8}-ns1-t1-{uuid}.binpb
//! ```
//!
//! `n_keys` records the number of object rows. Decoding fails with
//! `Corrupted` when it disagrees with the rows actually read.

use std::io::{Read, Seek};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use im::OrdMap;
use tidal_core::error::{Error, Result};
use tidal_core::keys::{
    has_object_prefix, ObjectKey, CREATED_AT_MILLIS_KEY, LAKEHOUSE_DEF_KEY, N_KEYS_KEY,
    PREVIOUS_ROOT_KEY, ROLLBACK_FROM_ROOT_KEY,
};

use crate::root::Root;

const KEY_COLUMN: &str = "key";
const VALUE_COLUMN: &str = "value";

fn node_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(KEY_COLUMN, DataType::Utf8, false),
        Field::new(VALUE_COLUMN, DataType::Utf8, false),
    ]))
}

/// Encodes `root` as a node file stamped with `created_at_millis`.
///
/// # Errors
///
/// Returns `Internal` if Arrow fails to write the batch.
pub fn encode(root: &Root, created_at_millis: i64) -> Result<Bytes> {
    let capacity = root.row_count() + 5;
    let mut keys: Vec<&str> = Vec::with_capacity(capacity);
    let mut values: Vec<String> = Vec::with_capacity(capacity);

    keys.push(LAKEHOUSE_DEF_KEY);
    values.push(root.lakehouse_def_path().to_string());
    if let Some(previous) = root.previous_root_path() {
        keys.push(PREVIOUS_ROOT_KEY);
        values.push(previous.to_string());
    }
    if let Some(rollback) = root.rollback_from_root_path() {
        keys.push(ROLLBACK_FROM_ROOT_KEY);
        values.push(rollback.to_string());
    }
    keys.push(CREATED_AT_MILLIS_KEY);
    values.push(created_at_millis.to_string());
    keys.push(N_KEYS_KEY);
    values.push(root.row_count().to_string());

    for (key, value) in root.rows() {
        keys.push(key.as_str());
        values.push(value.clone());
    }

    write_batch(keys, values).map_err(|e| Error::Internal {
        message: format!("encode root node: {e}"),
    })
}

fn write_batch(keys: Vec<&str>, values: Vec<String>) -> std::result::Result<Bytes, ArrowError> {
    let schema = node_schema();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(keys)) as ArrayRef,
            Arc::new(StringArray::from(values)) as ArrayRef,
        ],
    )?;

    let mut writer = FileWriter::try_new(Vec::new(), &schema)?;
    writer.write(&batch)?;
    writer.finish()?;
    Ok(Bytes::from(writer.into_inner()?))
}

#[derive(Default)]
struct SystemFields {
    lakehouse_def: Option<String>,
    previous_root: Option<String>,
    rollback_from_root: Option<String>,
    created_at_millis: Option<i64>,
    n_keys: Option<usize>,
}

/// Decodes a node file read from `path`.
///
/// The returned root is not yet marked persisted; the caller attaches the
/// location it was read from.
///
/// # Errors
///
/// Returns `Corrupted` for an unreadable file, an unexpected schema, null,
/// duplicate or unknown keys, a missing lakehouse definition, or an `n_keys`
/// mismatch.
pub fn decode<R: Read + Seek>(path: &str, reader: R) -> Result<Root> {
    let corrupted = |message: String| Error::corrupted(path, message);

    let reader = FileReader::try_new(reader, None)
        .map_err(|e| corrupted(format!("invalid node file: {e}")))?;
    check_schema(&reader.schema()).map_err(corrupted)?;

    let mut system = SystemFields::default();
    let mut rows: OrdMap<ObjectKey, String> = OrdMap::new();

    for batch in reader {
        let batch = batch.map_err(|e| corrupted(format!("invalid record batch: {e}")))?;
        let keys = string_column(&batch, 0).map_err(corrupted)?;
        let values = string_column(&batch, 1).map_err(corrupted)?;

        for i in 0..batch.num_rows() {
            let (key, value) = (keys.value(i), values.value(i));
            if has_object_prefix(key) {
                if rows.insert(ObjectKey::from_raw(key), value.to_string()).is_some() {
                    return Err(corrupted(format!("duplicate key {key:?}")));
                }
                continue;
            }

            let slot_taken = match key {
                LAKEHOUSE_DEF_KEY => system.lakehouse_def.replace(value.to_string()).is_some(),
                PREVIOUS_ROOT_KEY => system.previous_root.replace(value.to_string()).is_some(),
                ROLLBACK_FROM_ROOT_KEY => {
                    system.rollback_from_root.replace(value.to_string()).is_some()
                }
                CREATED_AT_MILLIS_KEY => {
                    let millis = value.parse::<i64>().map_err(|e| {
                        corrupted(format!("invalid {CREATED_AT_MILLIS_KEY} {value:?}: {e}"))
                    })?;
                    system.created_at_millis.replace(millis).is_some()
                }
                N_KEYS_KEY => {
                    let n = value
                        .parse::<usize>()
                        .map_err(|e| corrupted(format!("invalid {N_KEYS_KEY} {value:?}: {e}")))?;
                    system.n_keys.replace(n).is_some()
                }
                other => return Err(corrupted(format!("unknown key {other:?}"))),
            };
            if slot_taken {
                return Err(corrupted(format!("duplicate key {key:?}")));
            }
        }
    }

    let lakehouse_def = system
        .lakehouse_def
        .ok_or_else(|| corrupted(format!("missing {LAKEHOUSE_DEF_KEY}")))?;
    let created_at_millis = system
        .created_at_millis
        .ok_or_else(|| corrupted(format!("missing {CREATED_AT_MILLIS_KEY}")))?;
    let n_keys = system
        .n_keys
        .ok_or_else(|| corrupted(format!("missing {N_KEYS_KEY}")))?;
    if n_keys != rows.len() {
        return Err(corrupted(format!(
            "{N_KEYS_KEY} records {n_keys} rows but {} were read",
            rows.len()
        )));
    }

    Ok(Root::from_parts(
        lakehouse_def,
        system.previous_root,
        system.rollback_from_root,
        created_at_millis,
        rows,
    ))
}

fn check_schema(schema: &Schema) -> std::result::Result<(), String> {
    let expected = node_schema();
    let matches = schema.fields().len() == expected.fields().len()
        && schema
            .fields()
            .iter()
            .zip(expected.fields().iter())
            .all(|(actual, wanted)| {
                actual.name() == wanted.name() && actual.data_type() == wanted.data_type()
            });
    if matches {
        Ok(())
    } else {
        Err(format!("unexpected node schema: {schema}"))
    }
}

fn string_column(batch: &RecordBatch, index: usize) -> std::result::Result<&StringArray, String> {
    let column = batch.column(index);
    if column.null_count() > 0 {
        return Err(format!("column {index} contains nulls"));
    }
    column
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| format!("column {index} is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_root() -> Root {
        let mut root = Root::new("_lakehouse_def_a.binpb")
            .with_row(ObjectKey::from_raw("B===ns1     "), "0000/0000/0000/00000000-ns1-a.binpb")
            .with_row(ObjectKey::from_raw("C===ns1     t1      "), "t1.binpb");
        root.set_previous_root_path(tidal_core::paths::root_path(0));
        root
    }

    fn raw_node(keys: Vec<&str>, values: Vec<&str>) -> Bytes {
        write_batch(keys, values.into_iter().map(str::to_string).collect()).unwrap()
    }

    #[test]
    fn encode_then_decode_preserves_rows_and_system_fields() {
        let root = sample_root();
        let bytes = encode(&root, 1_718_000_000_000).unwrap();
        let decoded = decode("node.ipc", Cursor::new(bytes)).unwrap();

        assert_eq!(decoded.lakehouse_def_path(), "_lakehouse_def_a.binpb");
        assert_eq!(decoded.previous_root_path(), root.previous_root_path());
        assert_eq!(decoded.rollback_from_root_path(), None);
        assert_eq!(decoded.created_at_millis(), Some(1_718_000_000_000));
        assert_eq!(decoded.row_count(), 2);
        assert_eq!(
            decoded.rows().collect::<Vec<_>>(),
            root.rows().collect::<Vec<_>>()
        );
    }

    #[test]
    fn row_count_mismatch_is_corruption() {
        let bytes = raw_node(
            vec!["lakehouse_def", "created_at_millis", "n_keys", "B===ns1     "],
            vec!["def", "1", "2", "ns1.binpb"],
        );
        let err = decode("_1000.ipc", Cursor::new(bytes)).unwrap_err();
        match err {
            Error::Corrupted { path, message } => {
                assert_eq!(path, "_1000.ipc");
                assert!(message.contains("n_keys"), "{message}");
            }
            other => panic!("expected corruption, got {other:?}"),
        }
    }

    #[test]
    fn missing_lakehouse_def_is_corruption() {
        let bytes = raw_node(vec!["created_at_millis", "n_keys"], vec!["1", "0"]);
        let err = decode("n.ipc", Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("lakehouse_def"));
    }

    #[test]
    fn missing_created_at_millis_is_corruption() {
        let bytes = raw_node(vec!["lakehouse_def", "n_keys"], vec!["def", "0"]);
        let err = decode("n.ipc", Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::Corrupted { .. }), "{err:?}");
        assert!(err.to_string().contains("created_at_millis"), "{err}");
    }

    #[test]
    fn unknown_and_duplicate_keys_are_corruption() {
        let bytes = raw_node(vec!["lakehouse_def", "n_keys", "version"], vec!["d", "0", "3"]);
        let err = decode("n.ipc", Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("unknown key"));

        let bytes = raw_node(
            vec!["lakehouse_def", "n_keys", "B===a", "B===a"],
            vec!["d", "2", "x", "y"],
        );
        let err = decode("n.ipc", Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("duplicate key"));

        let bytes = raw_node(vec!["lakehouse_def", "lakehouse_def", "n_keys"], vec!["d", "e", "0"]);
        assert!(decode("n.ipc", Cursor::new(bytes)).is_err());
    }

    #[test]
    fn garbage_is_corruption() {
        let err = decode("n.ipc", Cursor::new(Bytes::from_static(b"not arrow"))).unwrap_err();
        assert!(matches!(err, Error::Corrupted { .. }));
    }

    #[test]
    fn wrong_schema_is_corruption() {
        let schema = Arc::new(Schema::new(vec![Field::new("k", DataType::Utf8, false)]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(StringArray::from(vec!["lakehouse_def"])) as ArrayRef],
        )
        .unwrap();
        let mut writer = FileWriter::try_new(Vec::new(), &schema).unwrap();
        writer.write(&batch).unwrap();
        writer.finish().unwrap();
        let bytes = writer.into_inner().unwrap();

        let err = decode("n.ipc", Cursor::new(bytes)).unwrap_err();
        assert!(err.to_string().contains("unexpected node schema"));
    }
}
