#![allow(dead_code)]

use db::{Database, DbConfig, DbError};

/// Fresh in-memory database with the schema applied. Each call gets its own
/// database name so tests can run in parallel.
pub async fn setup_db() -> Result<Database, DbError> {
    let name = format!("test_{}", uuid::Uuid::new_v4().simple());
    db::init(&DbConfig::memory().with_database(name)).await
}
