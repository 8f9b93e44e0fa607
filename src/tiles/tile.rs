//! # Tile: a supervised node with owned and observed children.
//!
//! A [`Tile`] is a handle to a coordinator whose handler ([`TileHandler`])
//! implements the tile state machine on top of a pluggable [`TileBehavior`].
//!
//! ## Architecture
//! ```text
//!           control (start/stop, direct calls)
//!   parent ─────────────────────────────────────► managed child
//!     ▲                                               │
//!     └──── RegistrationStatusChange (one per child) ◄┘   health, bottom-up
//!     ▲
//!     └──── RegistrationStatusChange ◄──── dependent child (observed, not owned)
//! ```
//!
//! ## Rules
//! - Registrations to children are created on the first start only.
//! - Any child `ERROR` stops this tile with an error; it stays down until started again.
//! - A child going `DOWN` while this tile is `UP` stops the other managed children
//!   (fail-together); they are restarted once every dependent child is `UP` again.
//! - Stopping leaves managed children in `StoppedDueToError` alone.
//! - Closing never changes the visible [`TileState`].

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::core::{Context, Coordinator, EventHandler, Name, RegistrationId};
use crate::error::{CoordinatorError, HandlerError, VerifyError};
use crate::events::{Event, Status};
use crate::tiles::behavior::{Readiness, StartOutcome, TileBehavior, TileContext};
use crate::tiles::builder::TileBuilder;
use crate::tiles::state::TileState;
use crate::tiles::verifier::DependenciesVerifier;
use crate::tiles::NoopBehavior;

struct TileInner {
    coordinator: Coordinator,
    state: watch::Receiver<TileState>,
    managed: Vec<Tile>,
    dependents: Vec<Tile>,
    closed: Arc<AtomicBool>,
}

/// Handle to a supervised tile. Cloning yields another handle to the same tile.
#[derive(Clone)]
pub struct Tile {
    inner: Arc<TileInner>,
}

impl Tile {
    /// Starts building a tile named `name` (a pure composite until a behavior is set).
    pub fn builder(name: impl Into<Name>) -> TileBuilder<NoopBehavior> {
        TileBuilder::new(name)
    }

    pub(crate) fn from_parts(
        coordinator: Coordinator,
        state: watch::Receiver<TileState>,
        managed: Vec<Tile>,
        dependents: Vec<Tile>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(TileInner {
                coordinator,
                state,
                managed,
                dependents,
                closed,
            }),
        }
    }

    /// Tile name (shared with its coordinator).
    pub fn name(&self) -> &Name {
        self.inner.coordinator.name()
    }

    /// The coordinator backing this tile.
    pub fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TileState {
        *self.inner.state.borrow()
    }

    /// Receiver observing every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<TileState> {
        self.inner.state.clone()
    }

    /// Current health.
    pub fn status(&self) -> Status {
        self.inner.coordinator.status()
    }

    /// Children whose lifecycle this tile owns.
    pub fn managed_children(&self) -> &[Tile] {
        &self.inner.managed
    }

    /// Children whose health this tile observes without owning them.
    pub fn dependent_children(&self) -> &[Tile] {
        &self.inner.dependents
    }

    /// Starts the tile (and, once processed, its managed children). Idempotent.
    pub fn start(&self) -> Result<(), CoordinatorError> {
        self.inner.coordinator.start()
    }

    /// Stops the tile and its non-errored managed children. Idempotent.
    pub fn stop(&self) -> Result<(), CoordinatorError> {
        self.inner.coordinator.stop()
    }

    /// Posts an application payload to the tile's behavior.
    pub fn post<T: Any + Send + Sync>(&self, payload: T) {
        self.inner.coordinator.post_event(Event::custom(payload));
    }

    /// Closes the tile, then its managed children in reverse order. Idempotent.
    ///
    /// Every managed descendant is marked closed before any coordinator is,
    /// so none of them reports a stop while the tree is going away.
    pub fn close(&self) {
        if self.inner.closed.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        debug!(tile = %self.name(), "closing tile");
        self.mark_descendants_closed();
        self.close_coordinators();
    }

    fn mark_descendants_closed(&self) {
        for child in &self.inner.managed {
            child.inner.closed.store(true, AtomicOrdering::Release);
            child.mark_descendants_closed();
        }
    }

    fn close_coordinators(&self) {
        self.inner.coordinator.close();
        for child in self.inner.managed.iter().rev() {
            child.close_coordinators();
        }
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(AtomicOrdering::Acquire)
    }

    /// Completes once the tile's coordinator has finished closing.
    pub async fn terminated(&self) {
        self.inner.coordinator.terminated().await;
    }

    /// Checks the single-owner invariant for the tree rooted here.
    pub fn verify(&self) -> Result<(), VerifyError> {
        DependenciesVerifier::verify(self)
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("name", self.name())
            .field("state", &self.state())
            .field("status", &self.status())
            .finish()
    }
}

/// Completion of an asynchronous start hook, tagged with the run it belongs to.
struct StartCompleted {
    epoch: u64,
    result: Result<(), HandlerError>,
}

/// Event handler implementing the tile state machine.
pub(crate) struct TileHandler<B> {
    behavior: B,
    managed: Vec<Tile>,
    dependents: Vec<Tile>,
    state: watch::Sender<TileState>,
    closed: Arc<AtomicBool>,
    /// One single-member registration per child.
    children: HashMap<RegistrationId, Name>,
    child_status: HashMap<Name, Status>,
    registered: bool,
    readiness: Readiness,
    /// Incremented on every start and stop; stale async completions are dropped.
    epoch: u64,
    active: bool,
    /// Managed children were stopped by fail-together and await recovery.
    idle_by_me: bool,
    /// Errored managed children being restarted; their old `ERROR` is ignored
    /// until a newer report arrives.
    restarting: HashSet<Name>,
}

impl<B: TileBehavior> TileHandler<B> {
    pub(crate) fn new(
        behavior: B,
        managed: Vec<Tile>,
        dependents: Vec<Tile>,
        state: watch::Sender<TileState>,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            behavior,
            managed,
            dependents,
            state,
            closed,
            children: HashMap::new(),
            child_status: HashMap::new(),
            registered: false,
            readiness: Readiness::Pending,
            epoch: 0,
            active: false,
            idle_by_me: false,
            restarting: HashSet::new(),
        }
    }

    fn publish(&self, name: &Name, next: TileState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            debug!(tile = %name, state = next.as_label(), "tile state changed");
        }
    }

    fn register(&mut self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        for child in self.managed.iter().chain(self.dependents.iter()) {
            if self.children.values().any(|name| name == child.name()) {
                continue;
            }
            let registration =
                ctx.follow_status_changes(std::slice::from_ref(child.coordinator()))?;
            self.child_status
                .insert(child.name().clone(), registration.status());
            self.children.insert(registration.id(), child.name().clone());
        }
        self.registered = true;
        Ok(())
    }

    fn start_managed(&mut self) -> Result<(), CoordinatorError> {
        for child in &self.managed {
            if child.state() == TileState::StoppedDueToError && !child.coordinator().is_started() {
                self.restarting.insert(child.name().clone());
                self.child_status.insert(child.name().clone(), Status::Down);
            }
            child.start()?;
        }
        Ok(())
    }

    fn stop_managed(&self, name: &Name) {
        for child in &self.managed {
            if child.state() == TileState::StoppedDueToError {
                trace!(tile = %name, child = %child.name(), "leaving errored child alone");
                continue;
            }
            if let Err(e) = child.stop() {
                debug!(tile = %name, child = %child.name(), error = %e, "child stop skipped");
            }
        }
    }

    fn dependents_up(&self) -> bool {
        self.dependents.iter().all(|d| {
            self.child_status
                .get(d.name())
                .is_some_and(|status| status.is_up())
        })
    }

    fn handle_start(&mut self, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        self.epoch += 1;
        self.active = true;
        self.idle_by_me = false;
        self.readiness = Readiness::Pending;
        self.publish(ctx.name(), TileState::Started);

        if !self.registered {
            self.register(ctx)?;
        }
        self.start_managed()?;

        let outcome = self
            .behavior
            .on_start(&mut TileContext::new(ctx, &mut self.readiness))?;
        match outcome {
            StartOutcome::Ready => self.readiness = Readiness::Ready,
            StartOutcome::Pending(fut) => {
                self.readiness = Readiness::Pending;
                let epoch = self.epoch;
                let coordinator = ctx.coordinator().clone();
                tokio::spawn(async move {
                    let result = fut.await;
                    coordinator.post_event(Event::custom(StartCompleted { epoch, result }));
                });
            }
            StartOutcome::Deferred => {}
        }
        self.evaluate(ctx);
        Ok(())
    }

    fn handle_stop(&mut self, errored: bool, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        self.active = false;
        self.epoch += 1;
        self.idle_by_me = false;
        if !self.closed.load(AtomicOrdering::Acquire) {
            let next = if errored {
                TileState::StoppedDueToError
            } else {
                TileState::StoppedByParent
            };
            self.publish(ctx.name(), next);
            self.stop_managed(ctx.name());
        }
        let result = self
            .behavior
            .on_stop(&mut TileContext::new(ctx, &mut self.readiness));
        self.readiness = Readiness::Pending;
        result
    }

    fn handle_child_status(
        &mut self,
        registration: RegistrationId,
        status: Status,
        ctx: &mut Context<'_>,
    ) {
        let Some(child) = self.children.get(&registration).cloned() else {
            trace!(tile = %ctx.name(), %registration, "status change from foreign registration");
            return;
        };
        if status.is_error() && self.restarting.contains(&child) {
            trace!(tile = %ctx.name(), child = %child, "ignoring error reported before restart");
            return;
        }
        if !status.is_error() {
            self.restarting.remove(&child);
        }
        self.child_status.insert(child.clone(), status);

        match status {
            Status::Error => {
                warn!(tile = %ctx.name(), child = %child, "child failed; stopping tile");
                ctx.stop_with_error();
            }
            Status::Down if ctx.status().is_up() => {
                debug!(
                    tile = %ctx.name(),
                    child = %child,
                    "child went down; stopping managed children"
                );
                self.stop_managed(ctx.name());
                self.idle_by_me = true;
                ctx.update_status(Status::Down, &format!("{child} is down"));
            }
            Status::Down | Status::Up => self.evaluate(ctx),
        }
    }

    fn handle_custom(
        &mut self,
        payload: &crate::events::Payload,
        ctx: &mut Context<'_>,
    ) -> Result<(), HandlerError> {
        if let Some(done) = payload.downcast_ref::<StartCompleted>() {
            if done.epoch != self.epoch || !self.active {
                trace!(tile = %ctx.name(), "dropping completion of a previous run");
                return Ok(());
            }
            match &done.result {
                Ok(()) => self.readiness = Readiness::Ready,
                Err(e) => return Err(e.clone()),
            }
        } else {
            self.behavior
                .on_custom(payload, &mut TileContext::new(ctx, &mut self.readiness))?;
        }
        self.evaluate(ctx);
        Ok(())
    }

    /// Recomputes state and status from readiness and child health.
    fn evaluate(&mut self, ctx: &mut Context<'_>) {
        if !self.active {
            return;
        }
        if let Readiness::Failed(reason) = &self.readiness {
            let reason = Arc::clone(reason);
            self.publish(ctx.name(), TileState::StoppedDueToError);
            ctx.update_status(Status::Error, &reason);
            return;
        }
        self.publish(ctx.name(), TileState::Started);

        if self.idle_by_me && self.dependents_up() {
            debug!(tile = %ctx.name(), "dependencies recovered; restarting managed children");
            self.idle_by_me = false;
            if let Err(e) = self.start_managed() {
                warn!(tile = %ctx.name(), error = %e, "failed to restart managed children");
            }
        }

        let children_up = self.child_status.values().all(|s| s.is_up());
        if !children_up {
            ctx.update_status(Status::Down, "waiting for children");
        } else if self.readiness == Readiness::Ready {
            ctx.update_status(Status::Up, "ready");
        } else {
            ctx.update_status(Status::Down, "starting");
        }
    }
}

impl<B: TileBehavior> EventHandler for TileHandler<B> {
    fn on_event(&mut self, event: &mut Event, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        match event {
            Event::Start => self.handle_start(ctx),
            Event::Stop { errored } => self.handle_stop(*errored, ctx),
            Event::Error { cause, handled } => {
                if self
                    .behavior
                    .on_error(cause, &mut TileContext::new(ctx, &mut self.readiness))
                {
                    *handled = true;
                    self.evaluate(ctx);
                }
                Ok(())
            }
            Event::RegistrationStatusChange {
                registration,
                status,
            } => {
                self.handle_child_status(*registration, *status, ctx);
                Ok(())
            }
            Event::Custom { payload, .. } => self.handle_custom(payload, ctx),
            Event::Close => {
                self.active = false;
                self.behavior.on_close();
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
