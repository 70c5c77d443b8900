//! Static dispatch from queue name to the queue and the jobs it runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use queue_core::{JobFactory, QueueSettings, ReliableQueue};

/// Everything the orchestrator needs to work one queue.
#[derive(Clone)]
pub struct QueueBinding {
    pub queue: Arc<dyn ReliableQueue>,
    pub factory: Arc<dyn JobFactory>,
    pub settings: QueueSettings,
}

impl QueueBinding {
    pub fn name(&self) -> &str {
        self.queue.name()
    }
}

/// Registry of queues and their job factories, resolved once at startup.
#[derive(Clone, Default)]
pub struct JobRegistry {
    bindings: BTreeMap<String, QueueBinding>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `queue` with the factory building its jobs.
    ///
    /// Settings are normalized; a later registration under the same queue
    /// name replaces the earlier one.
    pub fn register(
        &mut self,
        queue: Arc<dyn ReliableQueue>,
        factory: Arc<dyn JobFactory>,
        settings: QueueSettings,
    ) {
        let name = queue.name().to_string();
        tracing::debug!(
            queue = %name,
            pass_time_secs = settings.pass_time_secs,
            lease_time_secs = settings.lease_time_secs,
            "Queue registered"
        );
        self.bindings.insert(
            name,
            QueueBinding {
                queue,
                factory,
                settings: settings.normalized(),
            },
        );
    }

    pub fn with(
        mut self,
        queue: Arc<dyn ReliableQueue>,
        factory: Arc<dyn JobFactory>,
        settings: QueueSettings,
    ) -> Self {
        self.register(queue, factory, settings);
        self
    }

    pub fn get(&self, queue: &str) -> Option<&QueueBinding> {
        self.bindings.get(queue)
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.bindings.contains_key(queue)
    }

    /// Registered queue names, sorted.
    pub fn queue_names(&self) -> Vec<&str> {
        self.bindings.keys().map(String::as_str).collect()
    }

    pub fn bindings(&self) -> impl Iterator<Item = &QueueBinding> {
        self.bindings.values()
    }

    /// Longest lease any registered queue grants.
    pub fn max_lease_time_secs(&self) -> Option<i64> {
        self.bindings.values().map(|b| b.settings.lease_time_secs).max()
    }
}
