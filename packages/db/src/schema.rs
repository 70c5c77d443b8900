//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates the queue, job state and datastore metadata tables. The
/// per-resource row tables are defined when their schema is set.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(QUEUE_ITEM_SCHEMA).await?.check()?;
    db.query(JOB_STATE_SCHEMA).await?.check()?;
    db.query(DATASTORE_META_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Queue item table schema.
const QUEUE_ITEM_SCHEMA: &str = r#"
-- Work items for every named queue
DEFINE TABLE IF NOT EXISTS queue_item SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS queue_name ON queue_item TYPE string;
-- Serialized JSON, opaque to the queue
DEFINE FIELD IF NOT EXISTS payload ON queue_item TYPE string;
DEFINE FIELD IF NOT EXISTS created ON queue_item TYPE int;
DEFINE FIELD IF NOT EXISTS expire ON queue_item TYPE int DEFAULT 0;

-- Claim scans claimable items of one queue in creation order
DEFINE INDEX IF NOT EXISTS queue_item_claim ON queue_item FIELDS queue_name, expire;
DEFINE INDEX IF NOT EXISTS queue_item_created ON queue_item FIELDS queue_name, created;
"#;

/// Job state table schema, keyed by job id.
const JOB_STATE_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job_state SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS status ON job_state TYPE string DEFAULT "waiting";
DEFINE FIELD IF NOT EXISTS error ON job_state TYPE option<string>;
DEFINE FIELD IF NOT EXISTS progress ON job_state FLEXIBLE TYPE object DEFAULT {};
DEFINE FIELD IF NOT EXISTS time_limit_secs ON job_state TYPE option<int>;
DEFINE FIELD IF NOT EXISTS updated_at ON job_state TYPE datetime DEFAULT time::now();

DEFINE INDEX IF NOT EXISTS job_state_status ON job_state FIELDS status;
"#;

/// Bookkeeping for the per-resource datastore tables, keyed by table name.
const DATASTORE_META_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS datastore_meta SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS table_schema ON datastore_meta FLEXIBLE TYPE object DEFAULT {};
DEFINE FIELD IF NOT EXISTS next_record ON datastore_meta TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS imported ON datastore_meta TYPE bool DEFAULT false;
"#;

/// Row table for one resource.
pub(crate) fn datastore_table_schema(table: &str) -> String {
    format!(
        r#"
DEFINE TABLE IF NOT EXISTS {table} SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS record_number ON {table} TYPE int;
DEFINE FIELD IF NOT EXISTS cells ON {table} TYPE array<string>;

DEFINE INDEX IF NOT EXISTS {table}_record_number ON {table} FIELDS record_number UNIQUE;
"#
    )
}
