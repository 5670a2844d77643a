//! SurrealDB integration.
//!
//! This crate provides the database connection, the schema, and repositories
//! for jobs, networks, providers and memberships. `SurrealJobStore` plugs the
//! job repository into the queue as its durable store.
//!
//! # Features
//!
//! - `memory` (default): Use in-memory storage for testing
//! - `rocksdb`: Use RocksDB for persistent file-based storage

mod connection;
mod job_store;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError};
pub use job_store::SurrealJobStore;
pub use schema::init_schema;

/// Connect with the given configuration and make sure the schema exists.
///
/// This should be called once at application startup; clone the returned
/// handle wherever it is needed.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = Database::connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
