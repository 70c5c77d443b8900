//! Lease-based reliable queue contract and the items it carries.

use std::sync::{LazyLock, Mutex, PoisonError};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use ulid::{Generator, Ulid};

/// Fallback pass time when a queue is configured with none or a non-positive value.
pub const DEFAULT_PASS_TIME_SECS: i64 = 15;

/// Fallback lease time when a queue is configured with none or a non-positive value.
pub const DEFAULT_LEASE_TIME_SECS: i64 = 30;

static ID_GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Unique identifier for a queue item.
///
/// Generated monotonically within a process so that items created in the
/// same millisecond still sort in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Ulid);

impl ItemId {
    /// Create a new item ID, strictly greater than any previously generated in this process.
    pub fn new() -> Self {
        let mut generator = ID_GENERATOR.lock().unwrap_or_else(PoisonError::into_inner);
        match generator.generate() {
            Ok(id) => Self(id),
            Err(_) => Self(Ulid::new()),
        }
    }

    /// Parse an item ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work held by a named queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub queue_name: String,
    /// Opaque to the queue; interpreted by the job registered for `queue_name`.
    pub payload: Value,
    /// Unix seconds at creation.
    pub created: i64,
    /// Unix seconds at which the current lease ends, `0` when never claimed or released.
    pub expire: i64,
}

impl QueueItem {
    /// Build a fresh, unclaimed item.
    pub fn new(queue_name: impl Into<String>, payload: Value, created: i64) -> Self {
        Self {
            id: ItemId::new(),
            queue_name: queue_name.into(),
            payload,
            created,
            expire: 0,
        }
    }

    /// Whether the item may be handed to a claimant at `now`.
    pub fn is_claimable(&self, now: i64) -> bool {
        self.expire == 0 || self.expire <= now
    }
}

/// Per-queue timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// How long one pass may keep claiming items from this queue.
    pub pass_time_secs: i64,
    /// Lease granted on every claim.
    pub lease_time_secs: i64,
}

impl QueueSettings {
    pub fn new(pass_time_secs: i64, lease_time_secs: i64) -> Self {
        Self {
            pass_time_secs,
            lease_time_secs,
        }
        .normalized()
    }

    /// Replace missing or non-positive values with the defaults.
    pub fn normalized(self) -> Self {
        Self {
            pass_time_secs: if self.pass_time_secs > 0 {
                self.pass_time_secs
            } else {
                DEFAULT_PASS_TIME_SECS
            },
            lease_time_secs: if self.lease_time_secs > 0 {
                self.lease_time_secs
            } else {
                DEFAULT_LEASE_TIME_SECS
            },
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            pass_time_secs: DEFAULT_PASS_TIME_SECS,
            lease_time_secs: DEFAULT_LEASE_TIME_SECS,
        }
    }
}

/// Queue errors. An empty queue is not one of them.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A named, durable store of work items with lease-based claiming.
///
/// Delivery is at-least-once: a claimed item whose lease runs out is handed
/// out again. Whether a claim is atomic across processes depends on the
/// backend; see each implementation.
pub trait ReliableQueue: Send + Sync {
    /// Name of the queue this handle operates on.
    fn name(&self) -> &str;

    /// Append an item carrying `payload`.
    fn create_item(&self, payload: Value) -> BoxFuture<'_, Result<ItemId, QueueError>>;

    /// Lease the oldest claimable item for `lease_secs`, or `None` when nothing is claimable.
    fn claim_item(&self, lease_secs: i64) -> BoxFuture<'_, Result<Option<QueueItem>, QueueError>>;

    /// Remove an item for good. Deleting a missing item is a no-op.
    fn delete_item<'a>(&'a self, item: &'a QueueItem) -> BoxFuture<'a, Result<(), QueueError>>;

    /// Drop the lease so the item is claimable again. `false` if the item is gone.
    fn release_item<'a>(&'a self, item: &'a QueueItem) -> BoxFuture<'a, Result<bool, QueueError>>;

    /// Push the lease end to `now + delta_secs`. `false` if unsupported or the item is gone.
    fn delay_item<'a>(
        &'a self,
        item: &'a QueueItem,
        delta_secs: i64,
    ) -> BoxFuture<'a, Result<bool, QueueError>>;

    /// Whether [`ReliableQueue::delay_item`] is implemented.
    fn supports_delay(&self) -> bool {
        false
    }

    /// Number of items in the queue regardless of lease state.
    fn number_of_items(&self) -> BoxFuture<'_, Result<u64, QueueError>>;
}
