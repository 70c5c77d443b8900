//! Persistent reliable queue backed by the `queue_item` table.

use std::sync::Arc;
use std::time::Duration;

use queue_core::{BoxFuture, Clock, ItemId, QueueError, QueueItem, ReliableQueue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::sql::Thing;

use crate::{Database, DbError};

/// Ceiling for the pause between claim rounds, in milliseconds.
const MAX_BACKOFF_MS: u32 = 20;

/// Result of one claim round.
enum Claim {
    /// Nothing in the queue is claimable.
    Empty,
    Won(QueueItemRecord),
    /// Another claimant took the candidate first.
    Lost(ItemId),
}

/// Write conflicts between concurrent transactions are reported as retryable.
fn is_retryable(err: &DbError) -> bool {
    matches!(err, DbError::Connection(e) if e.to_string().contains("can be retried"))
}

/// Internal record type for SurrealDB reads.
#[derive(Debug, Deserialize)]
struct QueueItemRecord {
    id: Option<Thing>,
    queue_name: String,
    payload: String,
    created: i64,
    expire: i64,
}

impl QueueItemRecord {
    fn into_item(self) -> Result<QueueItem, DbError> {
        let raw = self
            .id
            .as_ref()
            .map(|t| t.id.to_raw())
            .ok_or_else(|| DbError::Query("Queue item without record id".into()))?;
        let id = ItemId::parse(&raw)
            .map_err(|e| DbError::Serialization(format!("Bad queue item id {raw}: {e}")))?;
        Ok(QueueItem {
            id,
            queue_name: self.queue_name,
            payload: serde_json::from_str(&self.payload)?,
            created: self.created,
            expire: self.expire,
        })
    }
}

/// Struct for creating queue items.
#[derive(Debug, Clone, Serialize)]
struct QueueItemCreate {
    queue_name: String,
    payload: String,
    created: i64,
    expire: i64,
}

#[derive(Deserialize)]
struct CountResult {
    count: i64,
}

/// A named queue stored in SurrealDB.
///
/// Claims are a select followed by a conditional update that only succeeds
/// if the lease observed by the select is still in place. Each statement is
/// atomic in the store, so two workers polling the same queue from different
/// processes never both win the same lease.
#[derive(Clone)]
pub struct DatabaseQueue {
    db: Database,
    name: String,
    clock: Arc<dyn Clock>,
}

impl DatabaseQueue {
    pub fn new(db: Database, name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            name: name.into(),
            clock,
        }
    }

    async fn create(&self, payload: Value) -> Result<ItemId, DbError> {
        let id = ItemId::new();
        let data = QueueItemCreate {
            queue_name: self.name.clone(),
            payload: serde_json::to_string(&payload)?,
            created: self.clock.timestamp(),
            expire: 0,
        };

        let record: Option<QueueItemRecord> = self
            .db
            .create(("queue_item", id.to_string()))
            .content(data)
            .await?;

        record
            .map(|_| id)
            .ok_or_else(|| DbError::Query("Failed to create queue item".into()))
    }

    async fn claim(&self, lease_secs: i64) -> Result<Option<QueueItem>, DbError> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_claim(lease_secs).await {
                Ok(Claim::Empty) => return Ok(None),
                Ok(Claim::Won(record)) => return record.into_item().map(Some),
                Ok(Claim::Lost(id)) => {
                    tracing::debug!(queue = %self.name, item_id = %id, attempt, "Lost claim race, retrying");
                }
                Err(e) if is_retryable(&e) => {
                    tracing::debug!(queue = %self.name, attempt, error = %e, "Claim conflicted, retrying");
                }
                Err(e) => return Err(e),
            }
            attempt += 1;
            // Another claimant made progress; back off a little before looking again.
            tokio::time::sleep(Duration::from_millis(u64::from(attempt.min(MAX_BACKOFF_MS)))).await;
        }
    }

    /// One select-then-conditional-update round.
    async fn try_claim(&self, lease_secs: i64) -> Result<Claim, DbError> {
        let now = self.clock.timestamp();

        let mut result = self
            .db
            .query(
                "SELECT * FROM queue_item WHERE queue_name = $name AND (expire = 0 OR expire <= $now) ORDER BY created ASC, id ASC LIMIT 1",
            )
            .bind(("name", self.name.clone()))
            .bind(("now", now))
            .await?;

        let candidates: Vec<QueueItemRecord> = result.take(0)?;
        let Some(candidate) = candidates.into_iter().next() else {
            return Ok(Claim::Empty);
        };
        let candidate = candidate.into_item()?;

        let mut result = self
            .db
            .query(
                "UPDATE type::thing('queue_item', $id) SET expire = $expire WHERE expire = $observed RETURN AFTER",
            )
            .bind(("id", candidate.id.to_string()))
            .bind(("expire", now + lease_secs))
            .bind(("observed", candidate.expire))
            .await?;

        let claimed: Vec<QueueItemRecord> = result.take(0)?;
        Ok(match claimed.into_iter().next() {
            Some(record) => Claim::Won(record),
            None => Claim::Lost(candidate.id),
        })
    }

    async fn delete(&self, id: ItemId) -> Result<(), DbError> {
        let _: Option<QueueItemRecord> = self.db.delete(("queue_item", id.to_string())).await?;
        Ok(())
    }

    async fn set_expire(&self, id: ItemId, expire: i64) -> Result<bool, DbError> {
        let mut result = self
            .db
            .query("UPDATE type::thing('queue_item', $id) SET expire = $expire RETURN AFTER")
            .bind(("id", id.to_string()))
            .bind(("expire", expire))
            .await?;

        let records: Vec<QueueItemRecord> = result.take(0)?;
        Ok(!records.is_empty())
    }

    async fn count(&self) -> Result<u64, DbError> {
        let mut result = self
            .db
            .query("SELECT count() FROM queue_item WHERE queue_name = $name GROUP ALL")
            .bind(("name", self.name.clone()))
            .await?;

        let counts: Vec<CountResult> = result.take(0)?;
        Ok(counts.first().map_or(0, |c| c.count.max(0) as u64))
    }

    /// Reset leases that ran out so the items read as never claimed.
    ///
    /// Claiming already treats expired leases as free; this only tidies the
    /// table. Returns the number of items reset.
    pub async fn garbage_collect(&self) -> Result<usize, DbError> {
        let mut result = self
            .db
            .query(
                "UPDATE queue_item SET expire = 0 WHERE queue_name = $name AND expire != 0 AND expire < $now RETURN AFTER",
            )
            .bind(("name", self.name.clone()))
            .bind(("now", self.clock.timestamp()))
            .await?;

        let reset: Vec<QueueItemRecord> = result.take(0)?;
        if !reset.is_empty() {
            tracing::info!(queue = %self.name, count = reset.len(), "Reset expired leases");
        }
        Ok(reset.len())
    }

    /// Remove every item of this queue.
    pub async fn delete_queue(&self) -> Result<(), DbError> {
        self.db
            .query("DELETE queue_item WHERE queue_name = $name")
            .bind(("name", self.name.clone()))
            .await?
            .check()?;
        Ok(())
    }
}

impl From<DbError> for QueueError {
    fn from(err: DbError) -> Self {
        QueueError::Backend(err.to_string())
    }
}

impl ReliableQueue for DatabaseQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_item(&self, payload: Value) -> BoxFuture<'_, Result<ItemId, QueueError>> {
        Box::pin(async move { Ok(self.create(payload).await?) })
    }

    fn claim_item(&self, lease_secs: i64) -> BoxFuture<'_, Result<Option<QueueItem>, QueueError>> {
        Box::pin(async move { Ok(self.claim(lease_secs).await?) })
    }

    fn delete_item<'a>(&'a self, item: &'a QueueItem) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move { Ok(self.delete(item.id).await?) })
    }

    fn release_item<'a>(&'a self, item: &'a QueueItem) -> BoxFuture<'a, Result<bool, QueueError>> {
        Box::pin(async move { Ok(self.set_expire(item.id, 0).await?) })
    }

    fn delay_item<'a>(
        &'a self,
        item: &'a QueueItem,
        delta_secs: i64,
    ) -> BoxFuture<'a, Result<bool, QueueError>> {
        Box::pin(async move {
            let expire = self.clock.timestamp() + delta_secs;
            Ok(self.set_expire(item.id, expire).await?)
        })
    }

    fn supports_delay(&self) -> bool {
        true
    }

    fn number_of_items(&self) -> BoxFuture<'_, Result<u64, QueueError>> {
        Box::pin(async move { Ok(self.count().await?) })
    }
}
