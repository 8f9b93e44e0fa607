//! # LifecycleRegistry: process-wide lookup of live coordinators.
//!
//! The registry maps names to coordinators (held weakly, so a dropped
//! coordinator never lingers) and publishes every status change as a
//! [`StatusReport`] on its [`Bus`].
//!
//! ## Architecture
//! ```text
//! Coordinator::new ──► insert(name → Weak)          get_coordinator(name) ──► Coordinator
//!                                                         ▲
//! worker ── update_status(name, status, reason) ──► Bus ──► listener ──► SubscriberSet
//!                                                                         ├─► StatusTracker
//!                                                                         └─► LogWriter, custom...
//! ```
//!
//! ## Rules
//! - At most one **live** coordinator per name; a closed coordinator frees its name.
//! - Reports are fire-and-forget; subscribers are eventually consistent.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use tracing::debug;

use crate::config::Config;
use crate::core::builder::RegistryBuilder;
use crate::core::coordinator::Shared;
use crate::core::handler::EventHandler;
use crate::core::{Coordinator, Name};
use crate::error::CoordinatorError;
use crate::events::{Bus, Status, StatusReport};
use crate::subscribers::StatusTracker;

/// Registry of live coordinators and their published health.
pub struct LifecycleRegistry {
    cfg: Config,
    coordinators: RwLock<HashMap<Name, Weak<Shared>>>,
    bus: Bus,
    tracker: Arc<StatusTracker>,
}

impl LifecycleRegistry {
    /// Starts building a registry with the given configuration.
    pub fn builder(cfg: Config) -> RegistryBuilder {
        RegistryBuilder::new(cfg)
    }

    pub(crate) fn new_internal(cfg: Config, bus: Bus, tracker: Arc<StatusTracker>) -> Self {
        Self {
            cfg,
            coordinators: RwLock::new(HashMap::new()),
            bus,
            tracker,
        }
    }

    /// Configuration shared by everything created through this registry.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Bus carrying every [`StatusReport`].
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Latest known status of every coordinator, fed by the bus.
    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    /// Creates a coordinator using the configured batch size.
    pub fn create_coordinator<H: EventHandler>(
        self: &Arc<Self>,
        name: impl Into<Name>,
        handler: H,
    ) -> Result<Coordinator, CoordinatorError> {
        Coordinator::new(name, self.cfg.batch_size, handler, self)
    }

    /// Looks up a live coordinator by name.
    pub fn get_coordinator(&self, name: &str) -> Option<Coordinator> {
        let map = self.coordinators.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name).and_then(Coordinator::upgrade)
    }

    /// Forgets `name` and publishes its removal.
    pub fn remove_coordinator(&self, name: &str) {
        let removed = self
            .coordinators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_entry(name);
        if let Some((name, _)) = removed {
            debug!(coordinator = %name, "coordinator removed from registry");
            self.bus
                .publish(StatusReport::new(name, Status::Down).with_reason("closed").removed());
        }
    }

    /// Publishes the status of `name`.
    pub fn update_status(&self, name: &Name, status: Status, reason: &str) {
        self.bus
            .publish(StatusReport::new(name.clone(), status).with_reason(reason));
    }

    /// Sorted names of every live coordinator.
    pub fn names(&self) -> Vec<Name> {
        let map = self.coordinators.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<Name> = map
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn insert(&self, coordinator: &Coordinator) -> Result<(), CoordinatorError> {
        let mut map = self
            .coordinators
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let name = coordinator.name();
        if map.get(name.as_str()).is_some_and(|weak| weak.strong_count() > 0) {
            return Err(CoordinatorError::DuplicateName { name: name.clone() });
        }
        map.insert(name.clone(), coordinator.downgrade());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::HandlerFn;
    use crate::core::test_support::detached;

    #[tokio::test]
    async fn lookup_follows_coordinator_lifetime() {
        let registry = LifecycleRegistry::builder(Config::default()).build();
        let (a, _rx) = detached(&registry, "a");

        assert_eq!(registry.get_coordinator("a"), Some(a.clone()));
        assert_eq!(registry.names(), vec![Name::new("a")]);

        drop(a);
        assert!(registry.get_coordinator("a").is_none());
        assert!(registry.names().is_empty());

        let (_again, _rx2) = detached(&registry, "a");
        assert!(registry.get_coordinator("a").is_some());
    }

    #[tokio::test]
    async fn removal_frees_the_name_and_is_reported() {
        let registry = LifecycleRegistry::builder(Config::default()).build();
        let mut reports = registry.bus().subscribe();
        let (_a, _rx) = detached(&registry, "a");

        registry.remove_coordinator("a");
        registry.remove_coordinator("a");

        let report = reports.recv().await.expect("report");
        assert!(report.removed);
        assert_eq!(report.name.as_str(), "a");
        assert!(reports.try_recv().is_err());

        let noop = HandlerFn::new(|_, _| Ok(()));
        assert!(registry.create_coordinator("a", noop).is_ok());
    }
}
