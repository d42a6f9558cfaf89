use std::sync::Arc;

use super::{config::SupervisorConfig, supervisor::Supervisor};
use crate::config::{ConfigStore, DEFAULT_CONFIG_PATH, FileStore};
use crate::subscribers::Subscribe;
use crate::worker::WorkerRegistry;

/// Builder for constructing a [`Supervisor`].
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    store: Option<Arc<dyn ConfigStore>>,
    registry: WorkerRegistry,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            store: None,
            registry: WorkerRegistry::new(),
            subscribers: Vec::new(),
        }
    }

    /// Sets the configuration store (default: `env.json` in the working directory).
    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the variant registry (default: empty, every start fails).
    pub fn with_registry(mut self, registry: WorkerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues; they are started by [`Supervisor::run`].
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the supervisor. Does not need a running tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileStore::new(DEFAULT_CONFIG_PATH)));
        Arc::new(Supervisor::new_internal(
            self.cfg,
            store,
            self.registry,
            self.subscribers,
        ))
    }
}
