//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates all necessary tables, fields, and indexes. Safe to run on
/// every start.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    // Active jobs
    db.client().query(JOB_SCHEMA).await?.check()?;

    // Job history table (terminal jobs)
    db.client().query(JOB_HISTORY_SCHEMA).await?.check()?;

    // Networks, providers and their memberships
    db.client().query(NETWORK_SCHEMA).await?.check()?;
    db.client().query(PROVIDER_SCHEMA).await?.check()?;
    db.client().query(MEMBERSHIP_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// The full record is kept as JSON in `data`; the other fields exist for
/// filtering and ordering.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON job TYPE string;
DEFINE FIELD IF NOT EXISTS status ON job TYPE string;
DEFINE FIELD IF NOT EXISTS enqueued_ms ON job TYPE int;
DEFINE FIELD IF NOT EXISTS updated_ms ON job TYPE int;
DEFINE FIELD IF NOT EXISTS data ON job TYPE string;

DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_type ON job FIELDS job_type;
DEFINE INDEX IF NOT EXISTS job_enqueued ON job FIELDS enqueued_ms;
"#;

/// Job history table schema for auditing.
const JOB_HISTORY_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job_history SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS status ON job_history TYPE string;
DEFINE FIELD IF NOT EXISTS enqueued_ms ON job_history TYPE int;
DEFINE FIELD IF NOT EXISTS updated_ms ON job_history TYPE int;
DEFINE FIELD IF NOT EXISTS data ON job_history TYPE string;

DEFINE INDEX IF NOT EXISTS history_type ON job_history FIELDS job_type;
DEFINE INDEX IF NOT EXISTS history_status ON job_history FIELDS status;
DEFINE INDEX IF NOT EXISTS history_updated ON job_history FIELDS updated_ms;
"#;

/// Network table schema.
const NETWORK_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS network SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS network_id ON network TYPE string;
DEFINE FIELD IF NOT EXISTS name ON network TYPE string;
DEFINE FIELD IF NOT EXISTS network_type ON network TYPE option<string>;
DEFINE FIELD IF NOT EXISTS state ON network TYPE string ASSERT $value IN ["active", "inactive"];
DEFINE FIELD IF NOT EXISTS created_at ON network TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON network TYPE string;
DEFINE FIELD IF NOT EXISTS created_ms ON network TYPE int;

DEFINE INDEX IF NOT EXISTS network_created ON network FIELDS created_ms;
"#;

/// Provider table schema.
const PROVIDER_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS provider SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS provider_id ON provider TYPE string;
DEFINE FIELD IF NOT EXISTS name ON provider TYPE string;
DEFINE FIELD IF NOT EXISTS description ON provider TYPE option<string>;
DEFINE FIELD IF NOT EXISTS website_url ON provider TYPE option<string>;
DEFINE FIELD IF NOT EXISTS logo_url ON provider TYPE option<string>;
DEFINE FIELD IF NOT EXISTS licensed ON provider TYPE bool DEFAULT false;
DEFINE FIELD IF NOT EXISTS created_at ON provider TYPE string;
DEFINE FIELD IF NOT EXISTS updated_at ON provider TYPE string;
DEFINE FIELD IF NOT EXISTS created_ms ON provider TYPE int;

DEFINE INDEX IF NOT EXISTS provider_created ON provider FIELDS created_ms;
"#;

/// Network/provider join table schema.
const MEMBERSHIP_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS membership SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS network_id ON membership TYPE string;
DEFINE FIELD IF NOT EXISTS provider_id ON membership TYPE string;
DEFINE FIELD IF NOT EXISTS created_at ON membership TYPE string;
DEFINE FIELD IF NOT EXISTS created_ms ON membership TYPE int;

DEFINE INDEX IF NOT EXISTS membership_network ON membership FIELDS network_id;
DEFINE INDEX IF NOT EXISTS membership_provider ON membership FIELDS provider_id;
"#;
