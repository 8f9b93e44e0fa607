use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::{
    config::Config,
    events::{Bus, StatusReport},
    subscribers::{StatusTracker, Subscribe, SubscriberSet},
};

use super::registry::LifecycleRegistry;

/// Builder for constructing a [`LifecycleRegistry`] with optional subscribers.
pub struct RegistryBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl RegistryBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets status-report subscribers for observability.
    ///
    /// Subscribers receive every [`StatusReport`] through dedicated workers
    /// with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the registry and spawns its report listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<LifecycleRegistry> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let tracker = Arc::new(StatusTracker::new());

        let mut subscribers = self.subscribers;
        subscribers.push(Arc::clone(&tracker) as Arc<dyn Subscribe>);
        let set = SubscriberSet::new(subscribers);
        tokio::spawn(listen(bus.subscribe(), set));

        Arc::new(LifecycleRegistry::new_internal(self.cfg, bus, tracker))
    }
}

/// Forwards bus reports to the subscriber set until the registry is dropped.
async fn listen(mut rx: broadcast::Receiver<StatusReport>, set: SubscriberSet) {
    loop {
        match rx.recv().await {
            Ok(report) => set.emit(report),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "status listener lagged; reports dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
    set.shutdown().await;
}
