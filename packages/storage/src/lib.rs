//! Object storage for export files.
//!
//! Export jobs write their output here. Backends:
//! - S3-compatible storage in production/staging
//! - On-disk storage for local dev
//! - In-memory storage for tests
//!
//! A thin wrapper around `object_store`, which already provides all three.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;
use serde::{Deserialize, Serialize};

/// Default root for the filesystem backend.
pub const DEFAULT_FS_ROOT: &str = "./data/exports";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object is not valid UTF-8: {0}")]
    NotText(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    S3,
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::S3 => "s3",
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    #[serde(default, skip_serializing)]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub secret_access_key: Option<String>,
    #[serde(default, skip_serializing)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub virtual_hosted_style: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageBackendConfig {
    S3(S3Config),
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all object keys.
    pub prefix: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::filesystem(DEFAULT_FS_ROOT)
    }
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn s3(cfg: S3Config) -> Self {
        Self {
            backend: StorageBackendConfig::S3(cfg),
            prefix: None,
        }
    }

    /// Set the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// Selection rules:
    /// - If `DISPATCH_STORAGE_BACKEND` is set: use it (`s3`, `filesystem`, `memory`)
    /// - Otherwise: default to filesystem (`./data/exports`)
    ///
    /// S3 env vars (S3-compatible):
    /// - `S3_BUCKET` (required when backend is `s3`)
    /// - `AWS_REGION` (default: `us-east-1`)
    /// - `S3_ENDPOINT` (optional, e.g. `http://localhost:9000`)
    /// - `S3_ALLOW_HTTP` (`true`/`false`, default: auto true if endpoint is http://)
    /// - `S3_VIRTUAL_HOSTED_STYLE` (`true`/`false`, default: false)
    /// - `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_SESSION_TOKEN` (optional; also picked up from the ambient AWS environment by the SDK)
    ///
    /// Filesystem env vars:
    /// - `DISPATCH_STORAGE_FS_ROOT` (default: `./data/exports`)
    ///
    /// Common:
    /// - `DISPATCH_STORAGE_PREFIX` (optional, e.g. `staging/`)
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("DISPATCH_STORAGE_BACKEND").ok().and_then(non_empty);
        let prefix = std::env::var("DISPATCH_STORAGE_PREFIX").ok().and_then(non_empty);

        let cfg = match backend.as_deref() {
            Some("s3") => Self::s3(read_s3_config()?),
            Some("filesystem") | Some("fs") | None => Self::filesystem(fs_root_from_env()),
            Some("memory") | Some("mem") => Self::memory(),
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported DISPATCH_STORAGE_BACKEND={other} (expected s3|filesystem|memory)"
                )));
            }
        };

        Ok(Self { prefix, ..cfg })
    }
}

#[derive(Clone)]
pub struct Storage {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl Storage {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub fn kind_str(&self) -> &'static str {
        self.kind.as_str()
    }

    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store) = match cfg.backend {
            StorageBackendConfig::S3(s3) => (StorageKind::S3, Arc::new(build_s3(s3).await?) as _),
            StorageBackendConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                (StorageKind::Filesystem, Arc::new(fs) as _)
            }
            StorageBackendConfig::Memory => {
                let mem = object_store::memory::InMemory::new();
                (StorageKind::Memory, Arc::new(mem) as _)
            }
        };

        Ok(Self {
            kind,
            store,
            prefix: cfg.prefix.and_then(non_empty),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    fn to_path(&self, key: &str) -> Result<Path, StorageError> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(StorageError::InvalidConfig(
                "object key must not be empty".to_string(),
            ));
        }

        let joined = match self.prefix.as_deref() {
            Some(prefix) => {
                let prefix = prefix.trim_matches('/');
                if prefix.is_empty() {
                    key.to_string()
                } else {
                    format!("{prefix}/{key}")
                }
            }
            None => key.to_string(),
        };

        Ok(Path::from(joined))
    }

    pub async fn put_bytes(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        self.store
            .put(&path, object_store::PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    pub async fn get_bytes(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.to_path(key)?;
        let res = match self.store.get(&path).await {
            Ok(res) => res,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(res.bytes().await?)
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the object at `key` with `text`.
    pub async fn put_text(&self, key: &str, text: &str) -> Result<(), StorageError> {
        self.put_bytes(key, Bytes::copy_from_slice(text.as_bytes()))
            .await
    }

    pub async fn get_text(&self, key: &str) -> Result<String, StorageError> {
        let bytes = self.get_bytes(key).await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| StorageError::NotText(key.to_string()))
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.get_bytes(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn fs_root_from_env() -> PathBuf {
    std::env::var("DISPATCH_STORAGE_FS_ROOT")
        .ok()
        .and_then(non_empty)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FS_ROOT))
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool_env(var_name: &str) -> Result<Option<bool>, StorageError> {
    let v = match std::env::var(var_name) {
        Ok(v) => v,
        Err(std::env::VarError::NotPresent) => return Ok(None),
        Err(e) => {
            return Err(StorageError::InvalidConfig(format!(
                "failed reading {var_name}: {e}"
            )));
        }
    };

    let normalized = v.trim().to_ascii_lowercase();
    let parsed = match normalized.as_str() {
        "1" | "true" | "yes" | "y" => true,
        "0" | "false" | "no" | "n" => false,
        _ => {
            return Err(StorageError::InvalidConfig(format!(
                "invalid boolean for {var_name}={v} (expected true/false)"
            )));
        }
    };
    Ok(Some(parsed))
}

fn read_s3_config() -> Result<S3Config, StorageError> {
    let bucket = std::env::var("S3_BUCKET")
        .ok()
        .and_then(non_empty)
        .ok_or_else(|| {
            StorageError::InvalidConfig("S3_BUCKET is required for s3 backend".into())
        })?;

    let region = std::env::var("AWS_REGION")
        .ok()
        .and_then(non_empty)
        .unwrap_or_else(|| "us-east-1".to_string());

    let endpoint = std::env::var("S3_ENDPOINT").ok().and_then(non_empty);
    let allow_http = match parse_bool_env("S3_ALLOW_HTTP")? {
        Some(v) => v,
        None => endpoint
            .as_deref()
            .is_some_and(|e| e.trim_start().to_ascii_lowercase().starts_with("http://")),
    };

    let virtual_hosted_style = parse_bool_env("S3_VIRTUAL_HOSTED_STYLE")?.unwrap_or(false);

    let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok().and_then(non_empty);
    let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .ok()
        .and_then(non_empty);
    let session_token = std::env::var("AWS_SESSION_TOKEN").ok().and_then(non_empty);

    Ok(S3Config {
        bucket,
        region,
        endpoint,
        allow_http,
        access_key_id,
        secret_access_key,
        session_token,
        virtual_hosted_style,
    })
}

async fn build_s3(cfg: S3Config) -> Result<object_store::aws::AmazonS3, StorageError> {
    let mut builder = object_store::aws::AmazonS3Builder::new()
        .with_bucket_name(cfg.bucket)
        .with_region(cfg.region)
        .with_virtual_hosted_style_request(cfg.virtual_hosted_style);

    if let Some(endpoint) = cfg.endpoint {
        builder = builder.with_endpoint(endpoint);
    }
    if cfg.allow_http {
        builder = builder.with_allow_http(true);
    }
    if let Some(access_key_id) = cfg.access_key_id {
        builder = builder.with_access_key_id(access_key_id);
    }
    if let Some(secret_access_key) = cfg.secret_access_key {
        builder = builder.with_secret_access_key(secret_access_key);
    }
    if let Some(session_token) = cfg.session_token {
        builder = builder.with_token(session_token);
    }

    Ok(builder.build()?)
}
