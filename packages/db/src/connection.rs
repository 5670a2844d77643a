//! Database connection management.

use serde::{Deserialize, Serialize};
use surrealdb::engine::any::{Any, connect};
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;
use thiserror::Error;

use dispatch_core::{DataError, StoreError};

/// Database configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Connection mode: "mem://", "rocksdb://path" or a remote endpoint
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "dispatch".to_string(),
            database: "main".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.into()),
            ..Default::default()
        }
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set root credentials for authentication.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Serialization(msg) => StoreError::Serialization(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

impl From<DbError> for DataError {
    fn from(e: DbError) -> Self {
        DataError::Backend(e.to_string())
    }
}

/// Handle to a connected database.
///
/// Cheap to clone; every clone shares the same connection. Pass it to the
/// repositories that need it.
#[derive(Clone)]
pub struct Database {
    client: Surreal<Any>,
}

impl Database {
    /// Connect and select the configured namespace and database.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        tracing::info!("Connecting to database: {}", config.endpoint);

        let client = connect(config.endpoint.as_str()).await?;

        // Authenticate if credentials provided
        if let Some((username, password)) = &config.credentials {
            client
                .signin(Root {
                    username,
                    password,
                })
                .await?;
        }

        client.use_ns(&config.namespace).use_db(&config.database).await?;

        tracing::info!(
            "Connected to database: {}/{}",
            config.namespace,
            config.database
        );

        Ok(Self { client })
    }

    /// The underlying SurrealDB client.
    pub fn client(&self) -> &Surreal<Any> {
        &self.client
    }
}
