use std::sync::Arc;

use queue_core::ManualClock;

use db::{Database, DbConfig, DbError};

/// Fresh in-memory database with the schema applied.
///
/// Every `mem://` connection is its own datastore, so tests do not share state.
pub async fn setup_db() -> Result<Database, DbError> {
    db::init(&DbConfig::memory()).await
}

/// Clock frozen at a fixed, recognisable instant.
pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at(1_700_000_000))
}
