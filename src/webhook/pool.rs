//! Per-worker webhook dispatchers.
//!
//! Each worker slot lazily builds its own dispatcher, and with it its own
//! upstream connection pool. Slots are picked from the current thread so
//! a Tokio worker keeps reusing the same dispatcher.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};
use std::thread;

use crate::load_balancer::BackendManager;
use crate::webhook::{WebhookCallback, WebhookDispatcher, WebhookEndpoint};

pub struct DispatcherPool {
    endpoint: Arc<WebhookEndpoint>,
    backends: Arc<BackendManager>,
    callback: Arc<dyn WebhookCallback>,
    slots: Vec<OnceLock<Arc<WebhookDispatcher>>>,
}

impl DispatcherPool {
    /// `workers` defaults to the available parallelism.
    pub fn new(
        endpoint: WebhookEndpoint,
        backends: Arc<BackendManager>,
        callback: Arc<dyn WebhookCallback>,
        workers: Option<usize>,
    ) -> Self {
        let workers = workers
            .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);
        Self {
            endpoint: Arc::new(endpoint),
            backends,
            callback,
            slots: (0..workers).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots whose dispatcher has been built.
    #[cfg(test)]
    pub fn initialized(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Dispatcher of the calling worker.
    pub fn dispatcher(&self) -> Arc<WebhookDispatcher> {
        let mut hasher = DefaultHasher::new();
        thread::current().id().hash(&mut hasher);
        self.slot(hasher.finish() as usize)
    }

    pub fn slot(&self, index: usize) -> Arc<WebhookDispatcher> {
        let index = index % self.slots.len();
        let dispatcher = self.slots[index].get_or_init(|| {
            tracing::debug!(slot = index, "Creating webhook dispatcher");
            Arc::new(WebhookDispatcher::new(
                Arc::clone(&self.endpoint),
                Arc::clone(&self.backends),
                Arc::clone(&self.callback),
            ))
        });
        Arc::clone(dispatcher)
    }
}
