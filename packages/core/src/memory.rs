//! In-process queue and job store.
//!
//! Both live in a single process's memory and vanish with it. Claims are
//! serialized by a mutex, so they are atomic between tasks of one process but
//! offer nothing across processes. Use them for tests and single-process runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::clock::Clock;
use crate::job::{JobId, JobState, JobStore, StoreError};
use crate::queue::{ItemId, QueueError, QueueItem, ReliableQueue};

/// Non-persistent [`ReliableQueue`].
pub struct MemoryQueue {
    name: String,
    clock: Arc<dyn Clock>,
    items: Mutex<Vec<QueueItem>>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            clock,
            items: Mutex::new(Vec::new()),
        }
    }

    fn items(&self) -> MutexGuard<'_, Vec<QueueItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of every item, for inspection.
    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.items().clone()
    }
}

impl ReliableQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_item(&self, payload: Value) -> BoxFuture<'_, Result<ItemId, QueueError>> {
        Box::pin(async move {
            let item = QueueItem::new(&self.name, payload, self.clock.timestamp());
            let id = item.id;
            self.items().push(item);
            Ok(id)
        })
    }

    fn claim_item(&self, lease_secs: i64) -> BoxFuture<'_, Result<Option<QueueItem>, QueueError>> {
        Box::pin(async move {
            let now = self.clock.timestamp();
            let mut items = self.items();
            let claimed = items
                .iter_mut()
                .filter(|item| item.is_claimable(now))
                .min_by_key(|item| (item.created, item.id))
                .map(|item| {
                    item.expire = now + lease_secs;
                    item.clone()
                });
            Ok(claimed)
        })
    }

    fn delete_item<'a>(&'a self, item: &'a QueueItem) -> BoxFuture<'a, Result<(), QueueError>> {
        Box::pin(async move {
            self.items().retain(|existing| existing.id != item.id);
            Ok(())
        })
    }

    fn release_item<'a>(&'a self, item: &'a QueueItem) -> BoxFuture<'a, Result<bool, QueueError>> {
        Box::pin(async move {
            let mut items = self.items();
            match items.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => {
                    existing.expire = 0;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn delay_item<'a>(
        &'a self,
        item: &'a QueueItem,
        delta_secs: i64,
    ) -> BoxFuture<'a, Result<bool, QueueError>> {
        Box::pin(async move {
            let now = self.clock.timestamp();
            let mut items = self.items();
            match items.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => {
                    existing.expire = now + delta_secs;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn supports_delay(&self) -> bool {
        true
    }

    fn number_of_items(&self) -> BoxFuture<'_, Result<u64, QueueError>> {
        Box::pin(async move { Ok(self.items().len() as u64) })
    }
}

/// Non-persistent [`JobStore`].
#[derive(Default)]
pub struct MemoryJobStore {
    states: Mutex<HashMap<JobId, JobState>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<JobId, JobState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobStore for MemoryJobStore {
    fn load<'a>(&'a self, id: &'a JobId) -> BoxFuture<'a, Result<Option<JobState>, StoreError>> {
        Box::pin(async move { Ok(self.states().get(id).cloned()) })
    }

    fn save<'a>(&'a self, id: &'a JobId, state: &'a JobState) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.states().insert(id.clone(), state.clone());
            Ok(())
        })
    }

    fn remove<'a>(&'a self, id: &'a JobId) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.states().remove(id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use serde_json::json;

    fn queue() -> (Arc<ManualClock>, MemoryQueue) {
        let clock = Arc::new(ManualClock::at(1_000));
        let queue = MemoryQueue::new("test", clock.clone());
        (clock, queue)
    }

    #[tokio::test]
    async fn count_tracks_creates_and_deletes() -> Result<(), QueueError> {
        let (_, queue) = queue();
        for n in 0..5 {
            queue.create_item(json!({ "n": n })).await?;
        }
        for _ in 0..2 {
            if let Some(item) = queue.claim_item(30).await? {
                queue.delete_item(&item).await?;
            }
        }
        assert_eq!(queue.number_of_items().await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn claims_oldest_first() -> Result<(), QueueError> {
        let (_, queue) = queue();
        queue.create_item(json!("first")).await?;
        queue.create_item(json!("second")).await?;

        let first = queue.claim_item(30).await?;
        let second = queue.claim_item(30).await?;
        assert_eq!(first.map(|i| i.payload), Some(json!("first")));
        assert_eq!(second.map(|i| i.payload), Some(json!("second")));
        assert!(queue.claim_item(30).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn lease_blocks_until_expiry() -> Result<(), QueueError> {
        let (clock, queue) = queue();
        let id = queue.create_item(json!("x")).await?;

        let claimed = queue.claim_item(30).await?;
        assert_eq!(claimed.as_ref().map(|i| i.id), Some(id));
        assert!(queue.claim_item(30).await?.is_none());

        clock.advance(Duration::seconds(31));
        let again = queue.claim_item(30).await?;
        assert_eq!(again.map(|i| i.id), Some(id));
        Ok(())
    }

    #[tokio::test]
    async fn release_and_delay_report_missing_items() -> Result<(), QueueError> {
        let (clock, queue) = queue();
        queue.create_item(json!("x")).await?;
        let Some(item) = queue.claim_item(30).await? else {
            panic!("expected an item");
        };

        assert!(queue.release_item(&item).await?);
        let Some(item) = queue.claim_item(30).await? else {
            panic!("released item should be claimable");
        };

        assert!(queue.delay_item(&item, 300).await?);
        clock.advance(Duration::seconds(60));
        assert!(queue.claim_item(30).await?.is_none());

        queue.delete_item(&item).await?;
        queue.delete_item(&item).await?;
        assert!(!queue.release_item(&item).await?);
        assert!(!queue.delay_item(&item, 10).await?);
        Ok(())
    }
}
