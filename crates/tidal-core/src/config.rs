//! Catalog configuration.
//!
//! Configuration selects a storage backend and an optional key prefix for
//! the lakehouse root. It can be built in code, deserialized, or loaded from
//! `TIDAL_*` environment variables with [`CatalogConfig::from_env`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object_store_backend::ObjectStoreBackend;
use crate::observability::LogFormat;
use crate::storage::{MemoryBackend, StorageBackend};

/// Connection settings for an S3-compatible bucket.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Region name.
    pub region: String,
    /// Endpoint override for S3-compatible stores.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static access key id. Falls back to the ambient credential chain.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Static secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Allow plain HTTP endpoints (local test stores).
    #[serde(default)]
    pub allow_http: bool,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local memory. Contents are lost on drop.
    #[default]
    Memory,
    /// Local filesystem rooted at a directory.
    Local {
        /// Root directory; created if missing.
        root: PathBuf,
    },
    /// S3-compatible object storage.
    S3(S3Config),
}

impl StorageConfig {
    /// Builds the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be constructed.
    pub fn build(&self) -> Result<Arc<dyn StorageBackend>> {
        let backend: Arc<dyn StorageBackend> = match self {
            Self::Memory => Arc::new(MemoryBackend::new()),
            Self::Local { root } => Arc::new(ObjectStoreBackend::local(root)?),
            Self::S3(s3) => Arc::new(ObjectStoreBackend::s3(s3)?),
        };
        tracing::debug!(backend = self.kind(), "built storage backend");
        Ok(backend)
    }

    /// Short backend name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Local { .. } => "local",
            Self::S3(_) => "s3",
        }
    }
}

/// Top-level catalog configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Storage backend.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Key prefix of the lakehouse root within the backend.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

impl CatalogConfig {
    /// Loads configuration from `TIDAL_*` environment variables.
    ///
    /// | Variable | Meaning |
    /// |----------|---------|
    /// | `TIDAL_STORAGE` | `memory` (default), `local` or `s3` |
    /// | `TIDAL_LOCAL_ROOT` | root directory, required for `local` |
    /// | `TIDAL_S3_BUCKET` | bucket, required for `s3` |
    /// | `TIDAL_S3_REGION` | region, default `us-east-1` |
    /// | `TIDAL_S3_ENDPOINT` | endpoint override |
    /// | `TIDAL_S3_ACCESS_KEY_ID` | static access key id |
    /// | `TIDAL_S3_SECRET_ACCESS_KEY` | static secret access key |
    /// | `TIDAL_S3_ALLOW_HTTP` | boolean, default false |
    /// | `TIDAL_PREFIX` | key prefix of the lakehouse root |
    /// | `TIDAL_LOG_FORMAT` | `pretty` (default) or `json` |
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` naming the variable with a bad or missing value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`CatalogConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name).and_then(|v| {
                let trimmed = v.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
        };
        let required = |name: &str, backend: &str| {
            var(name).ok_or_else(|| {
                Error::invalid_argument(format!("{name} is required for {backend} storage"))
            })
        };

        let storage = match var("TIDAL_STORAGE").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("memory") => StorageConfig::Memory,
            Some("local") => StorageConfig::Local {
                root: PathBuf::from(required("TIDAL_LOCAL_ROOT", "local")?),
            },
            Some("s3") => StorageConfig::S3(S3Config {
                bucket: required("TIDAL_S3_BUCKET", "s3")?,
                region: var("TIDAL_S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                endpoint: var("TIDAL_S3_ENDPOINT"),
                access_key_id: var("TIDAL_S3_ACCESS_KEY_ID"),
                secret_access_key: var("TIDAL_S3_SECRET_ACCESS_KEY"),
                allow_http: var("TIDAL_S3_ALLOW_HTTP")
                    .map(|v| parse_bool("TIDAL_S3_ALLOW_HTTP", &v))
                    .transpose()?
                    .unwrap_or(false),
            }),
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "TIDAL_STORAGE must be one of: memory, local, s3 (got {other})"
                )))
            }
        };

        let log_format = match var("TIDAL_LOG_FORMAT").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(Error::invalid_argument(format!(
                    "TIDAL_LOG_FORMAT must be one of: pretty, json (got {other})"
                )))
            }
        };

        Ok(Self {
            storage,
            prefix: var("TIDAL_PREFIX"),
            log_format,
        })
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::invalid_argument(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_to_memory() {
        let config = CatalogConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CatalogConfig::default());
        assert_eq!(config.storage.kind(), "memory");
    }

    #[test]
    fn local_requires_root() {
        let err = CatalogConfig::from_lookup(lookup(&[("TIDAL_STORAGE", "local")])).unwrap_err();
        assert!(err.to_string().contains("TIDAL_LOCAL_ROOT"));

        let config = CatalogConfig::from_lookup(lookup(&[
            ("TIDAL_STORAGE", "LOCAL"),
            ("TIDAL_LOCAL_ROOT", "/var/lib/tidal"),
            ("TIDAL_PREFIX", "warehouse"),
        ]))
        .unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::Local {
                root: PathBuf::from("/var/lib/tidal")
            }
        );
        assert_eq!(config.prefix.as_deref(), Some("warehouse"));
    }

    #[test]
    fn s3_settings() {
        let config = CatalogConfig::from_lookup(lookup(&[
            ("TIDAL_STORAGE", "s3"),
            ("TIDAL_S3_BUCKET", "lake"),
            ("TIDAL_S3_ENDPOINT", "http://localhost:9000"),
            ("TIDAL_S3_ALLOW_HTTP", "yes"),
            ("TIDAL_LOG_FORMAT", "json"),
        ]))
        .unwrap();

        let StorageConfig::S3(s3) = &config.storage else {
            panic!("expected s3 storage, got {:?}", config.storage);
        };
        assert_eq!(s3.bucket, "lake");
        assert_eq!(s3.region, "us-east-1");
        assert!(s3.allow_http);
        assert!(matches!(config.log_format, LogFormat::Json));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = CatalogConfig::from_lookup(lookup(&[("TIDAL_STORAGE", "gcs")])).unwrap_err();
        assert!(err.to_string().contains("TIDAL_STORAGE"));
        assert!(err.to_string().contains("gcs"));

        let err = CatalogConfig::from_lookup(lookup(&[
            ("TIDAL_STORAGE", "s3"),
            ("TIDAL_S3_BUCKET", "lake"),
            ("TIDAL_S3_ALLOW_HTTP", "maybe"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("TIDAL_S3_ALLOW_HTTP"));

        let err = CatalogConfig::from_lookup(lookup(&[("TIDAL_LOG_FORMAT", "xml")])).unwrap_err();
        assert!(err.to_string().contains("TIDAL_LOG_FORMAT"));
    }

    #[test]
    fn blank_values_are_unset() {
        let config = CatalogConfig::from_lookup(lookup(&[("TIDAL_STORAGE", "  "), ("TIDAL_PREFIX", "")]))
            .unwrap();
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.prefix, None);
    }

    #[test]
    fn s3_debug_redacts_secret() {
        let s3 = S3Config {
            bucket: "lake".into(),
            region: "eu-west-1".into(),
            endpoint: None,
            access_key_id: Some("AKIA".into()),
            secret_access_key: Some("super-secret".into()),
            allow_http: false,
        };
        let dbg = format!("{s3:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("super-secret"));
    }

    #[test]
    fn parse_bool_values() {
        assert!(parse_bool("TEST", "TRUE").unwrap());
        assert!(!parse_bool("TEST", "0").unwrap());
        assert!(parse_bool("TEST", "maybe").is_err());
    }

    #[test]
    fn local_config_builds_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StorageConfig::Local {
            root: dir.path().join("lake"),
        };
        assert!(config.build().is_ok());
        assert!(dir.path().join("lake").is_dir());
    }
}
