//! # Configuration-aware tile behavior.
//!
//! [`ConfigurationAwareBehavior`] subscribes to a [`ConfigurationSource`] on
//! every start and applies the value under one key through a
//! [`ConfigurationChangeHandler`].
//!
//! ## Update pipeline (on the tile's own worker)
//! ```text
//! source ──► forwarder ──(key changed & present)──► ConfigUpdate event
//!                                                       │
//!   parse ──Err──► fail (ERROR, StoppedDueToError; next valid update retried)
//!     │
//!     ├── equal to in-flight value ──► ignore
//!     ├── equal to last applied     ──► ready (UP)
//!     └── otherwise ──► apply(new, previous) ──► pending (DOWN)
//!                             │
//!                             └──► ApplyCompleted ──Ok──► last_applied = new, ready (UP)
//!                                                 └─Err──► fail (ERROR)
//! ```
//!
//! Stop and close forget the last applied value and unsubscribe, so the next
//! start re-applies from scratch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracing::{debug, trace, warn};

use crate::configuration::parser::{ConfigParser, json_parser};
use crate::configuration::source::{
    ConfigKey, ConfigSubscription, ConfigurationHandler, ConfigurationSource, RawConfig,
};
use crate::core::Coordinator;
use crate::error::{BoxError, ConfigError, HandlerError};
use crate::events::{Event, Payload};
use crate::tiles::{StartOutcome, TileBehavior, TileContext};

/// Applies a new typed configuration, possibly asynchronously.
pub trait ConfigurationChangeHandler<C>: Send + 'static {
    /// Applies `new`; `previous` is the last successfully applied value since start.
    ///
    /// The tile reports `DOWN` until the returned future resolves.
    fn apply_new_configuration(
        &mut self,
        new: &C,
        previous: Option<&C>,
    ) -> BoxFuture<'static, Result<(), HandlerError>>;
}

/// A configuration value under the tile's key, forwarded onto its worker.
struct ConfigUpdate {
    raw: RawConfig,
}

struct ApplyCompleted {
    seq: u64,
    result: Result<(), HandlerError>,
}

/// Posts relevant updates into the tile's mailbox.
struct Forwarder {
    key: ConfigKey,
    coordinator: Coordinator,
}

impl ConfigurationHandler for Forwarder {
    fn on_new_configuration(
        &self,
        changed: &HashSet<ConfigKey>,
        snapshot: &HashMap<ConfigKey, RawConfig>,
    ) {
        if !changed.contains(&self.key) {
            return;
        }
        match snapshot.get(&self.key) {
            Some(raw) => self
                .coordinator
                .post_event(Event::custom(ConfigUpdate { raw: raw.clone() })),
            None => trace!(
                tile = %self.coordinator.name(),
                key = %self.key,
                "configuration key absent"
            ),
        }
    }
}

/// Tile behavior driven by one configuration key.
pub struct ConfigurationAwareBehavior<C, H> {
    key: ConfigKey,
    source: Arc<dyn ConfigurationSource>,
    parser: ConfigParser<C>,
    handler: H,
    subscription: Option<ConfigSubscription>,
    last_applied: Option<C>,
    in_flight: Option<C>,
    apply_seq: u64,
}

impl<C, H> ConfigurationAwareBehavior<C, H>
where
    C: PartialEq + Send + 'static,
    H: ConfigurationChangeHandler<C>,
{
    /// Creates a behavior applying the value under `key` parsed by `parser`.
    pub fn new(
        key: impl Into<ConfigKey>,
        source: Arc<dyn ConfigurationSource>,
        parser: impl Fn(&RawConfig) -> Result<C, BoxError> + Send + 'static,
        handler: H,
    ) -> Self {
        Self {
            key: key.into(),
            source,
            parser: Box::new(parser),
            handler,
            subscription: None,
            last_applied: None,
            in_flight: None,
            apply_seq: 0,
        }
    }

    /// Same as [`new`](Self::new) with a `serde_json` parser.
    pub fn json(key: impl Into<ConfigKey>, source: Arc<dyn ConfigurationSource>, handler: H) -> Self
    where
        C: DeserializeOwned,
    {
        Self::new(key, source, json_parser::<C>(), handler)
    }

    fn reset(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close();
        }
        self.last_applied = None;
        self.in_flight = None;
        self.apply_seq += 1;
    }

    fn handle_update(&mut self, raw: &RawConfig, ctx: &mut TileContext<'_, '_>) {
        let value = match (self.parser)(raw) {
            Ok(value) => value,
            Err(e) => {
                let err = ConfigError::Parse {
                    key: self.key.clone(),
                    error: e.to_string(),
                };
                warn!(tile = %ctx.name(), error = %err, "rejecting configuration");
                self.in_flight = None;
                self.apply_seq += 1;
                ctx.fail(err.to_string());
                return;
            }
        };

        match &self.in_flight {
            Some(target) if *target == value => {
                trace!(tile = %ctx.name(), "configuration already being applied");
                return;
            }
            None if self.last_applied.as_ref() == Some(&value) => {
                debug!(tile = %ctx.name(), "configuration unchanged");
                ctx.set_ready();
                return;
            }
            _ => {}
        }

        self.apply_seq += 1;
        let seq = self.apply_seq;
        debug!(tile = %ctx.name(), seq, "applying configuration");
        let fut = self
            .handler
            .apply_new_configuration(&value, self.last_applied.as_ref());
        self.in_flight = Some(value);
        ctx.set_pending();
        ctx.spawn_and_post(async move {
            ApplyCompleted {
                seq,
                result: fut.await,
            }
        });
    }

    fn handle_completion(&mut self, done: &ApplyCompleted, ctx: &mut TileContext<'_, '_>) {
        if done.seq != self.apply_seq {
            trace!(tile = %ctx.name(), seq = done.seq, "dropping superseded configuration result");
            return;
        }
        let Some(value) = self.in_flight.take() else {
            return;
        };
        match &done.result {
            Ok(()) => {
                debug!(tile = %ctx.name(), seq = done.seq, "configuration applied");
                self.last_applied = Some(value);
                ctx.set_ready();
            }
            Err(e) => {
                warn!(tile = %ctx.name(), error = %e, "configuration could not be applied");
                ctx.fail(e.to_string());
            }
        }
    }
}

impl<C, H> TileBehavior for ConfigurationAwareBehavior<C, H>
where
    C: PartialEq + Send + 'static,
    H: ConfigurationChangeHandler<C>,
{
    fn on_start(&mut self, ctx: &mut TileContext<'_, '_>) -> Result<StartOutcome, HandlerError> {
        self.reset();
        let forwarder = Arc::new(Forwarder {
            key: self.key.clone(),
            coordinator: ctx.coordinator().clone(),
        });
        self.subscription = Some(self.source.register_for_updates(forwarder));
        Ok(StartOutcome::Deferred)
    }

    fn on_stop(&mut self, _ctx: &mut TileContext<'_, '_>) -> Result<(), HandlerError> {
        self.reset();
        Ok(())
    }

    fn on_custom(
        &mut self,
        payload: &Payload,
        ctx: &mut TileContext<'_, '_>,
    ) -> Result<(), HandlerError> {
        if let Some(update) = payload.downcast_ref::<ConfigUpdate>() {
            self.handle_update(&update.raw, ctx);
        } else if let Some(done) = payload.downcast_ref::<ApplyCompleted>() {
            self.handle_completion(done, ctx);
        }
        Ok(())
    }

    fn on_close(&mut self) {
        self.reset();
    }
}
