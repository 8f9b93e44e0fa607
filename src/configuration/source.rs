//! # Configuration sources.
//!
//! A [`ConfigurationSource`] pushes snapshots to registered handlers as
//! `(changed keys, snapshot by key)`. Registration returns a
//! [`ConfigSubscription`]; closing (or dropping) it unregisters the handler.
//!
//! ## Rules
//! - A handler registered on a non-empty source immediately receives the whole
//!   current snapshot, with every key marked changed.
//! - Handlers run on the publisher's thread and must not block.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tracing::debug;

/// Configuration key.
pub type ConfigKey = String;

/// Unparsed configuration value.
pub type RawConfig = serde_json::Value;

/// Receives configuration snapshots.
pub trait ConfigurationHandler: Send + Sync + 'static {
    /// Called with the keys that changed and the full snapshot after the change.
    fn on_new_configuration(
        &self,
        changed: &HashSet<ConfigKey>,
        snapshot: &HashMap<ConfigKey, RawConfig>,
    );
}

/// Anything that can push configuration snapshots.
pub trait ConfigurationSource: Send + Sync + 'static {
    /// Registers `handler` until the returned subscription is closed.
    fn register_for_updates(&self, handler: Arc<dyn ConfigurationHandler>) -> ConfigSubscription;
}

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle to a handler registered with a [`ConfigurationSource`].
///
/// Closing is idempotent; dropping the handle closes it.
pub struct ConfigSubscription {
    cancel: Mutex<Option<CancelFn>>,
}

impl ConfigSubscription {
    /// Wraps the action that unregisters the handler.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    /// Unregisters the handler. Only the first call has an effect.
    pub fn close(&self) {
        let cancel = self
            .cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }

    /// Returns `true` once closed.
    pub fn is_closed(&self) -> bool {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for ConfigSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ConfigSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSubscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[derive(Default)]
struct SourceState {
    snapshot: HashMap<ConfigKey, RawConfig>,
    handlers: BTreeMap<u64, Arc<dyn ConfigurationHandler>>,
    next_id: u64,
}

/// In-process configuration source holding a mutable snapshot.
///
/// ## Example
/// ```rust
/// use tilevisor::InMemoryConfigSource;
/// use serde_json::json;
///
/// let source = InMemoryConfigSource::new();
/// source.publish([("gateway.port", json!(8443))]);
/// assert_eq!(source.get("gateway.port"), Some(json!(8443)));
/// ```
#[derive(Clone, Default)]
pub struct InMemoryConfigSource {
    inner: Arc<Mutex<SourceState>>,
}

impl InMemoryConfigSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the given keys and notifies every handler.
    pub fn publish<K, I>(&self, entries: I)
    where
        K: Into<ConfigKey>,
        I: IntoIterator<Item = (K, RawConfig)>,
    {
        let (changed, snapshot, handlers) = {
            let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let mut changed = HashSet::new();
            for (key, value) in entries {
                let key = key.into();
                state.snapshot.insert(key.clone(), value);
                changed.insert(key);
            }
            let handlers: Vec<_> = state.handlers.values().cloned().collect();
            (changed, state.snapshot.clone(), handlers)
        };
        debug!(keys = changed.len(), handlers = handlers.len(), "publishing configuration");
        for handler in handlers {
            handler.on_new_configuration(&changed, &snapshot);
        }
    }

    /// Removes `key` and notifies every handler that it changed.
    pub fn remove(&self, key: &str) {
        let (changed, snapshot, handlers) = {
            let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if state.snapshot.remove(key).is_none() {
                return;
            }
            let handlers: Vec<_> = state.handlers.values().cloned().collect();
            (HashSet::from([key.to_string()]), state.snapshot.clone(), handlers)
        };
        for handler in handlers {
            handler.on_new_configuration(&changed, &snapshot);
        }
    }

    /// Current value under `key`.
    pub fn get(&self, key: &str) -> Option<RawConfig> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot
            .get(key)
            .cloned()
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .len()
    }
}

impl ConfigurationSource for InMemoryConfigSource {
    fn register_for_updates(&self, handler: Arc<dyn ConfigurationHandler>) -> ConfigSubscription {
        let (id, snapshot) = {
            let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = state.next_id;
            state.next_id += 1;
            state.handlers.insert(id, Arc::clone(&handler));
            (id, state.snapshot.clone())
        };
        if !snapshot.is_empty() {
            let changed: HashSet<ConfigKey> = snapshot.keys().cloned().collect();
            handler.on_new_configuration(&changed, &snapshot);
        }

        let weak: Weak<Mutex<SourceState>> = Arc::downgrade(&self.inner);
        ConfigSubscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .handlers
                    .remove(&id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<Vec<String>>>);

    impl ConfigurationHandler for Recorder {
        fn on_new_configuration(
            &self,
            changed: &HashSet<ConfigKey>,
            _snapshot: &HashMap<ConfigKey, RawConfig>,
        ) {
            let mut keys: Vec<String> = changed.iter().cloned().collect();
            keys.sort();
            self.0.lock().unwrap().push(keys);
        }
    }

    #[test]
    fn new_handlers_receive_the_current_snapshot() {
        let source = InMemoryConfigSource::new();
        source.publish([("a", json!(1)), ("b", json!(2))]);

        let recorder = Arc::new(Recorder::default());
        let _sub = source.register_for_updates(recorder.clone());

        assert_eq!(*recorder.0.lock().unwrap(), vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn closing_or_dropping_the_subscription_unregisters() {
        let source = InMemoryConfigSource::new();
        let recorder = Arc::new(Recorder::default());

        let sub = source.register_for_updates(recorder.clone());
        assert_eq!(source.handler_count(), 1);
        sub.close();
        sub.close();
        assert!(sub.is_closed());
        assert_eq!(source.handler_count(), 0);

        {
            let _dropped = source.register_for_updates(recorder.clone());
            assert_eq!(source.handler_count(), 1);
        }
        assert_eq!(source.handler_count(), 0);

        source.publish([("a", json!(1))]);
        assert!(recorder.0.lock().unwrap().is_empty());
    }
}
