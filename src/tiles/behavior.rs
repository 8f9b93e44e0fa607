//! # Tile strategy: what a tile does, as opposed to when.
//!
//! Every tile shares one state machine (see [`Tile`](crate::Tile)); the parts
//! that differ between leaf, composite and configuration-aware tiles are
//! injected through [`TileBehavior`].
//!
//! ## Readiness
//! A started tile reports `UP` only when all of its children are `UP` **and**
//! its behavior is ready:
//! ```text
//! on_start ─► Ready      → ready immediately
//!          ─► Pending(f) → ready when f resolves Ok (Err → error event)
//!          ─► Deferred   → ready when the behavior calls ctx.set_ready()
//! ```
//! `ctx.fail(reason)` reports `ERROR` while keeping the tile running, so a
//! later `set_ready()` recovers it without a restart.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::core::{Context, Coordinator, Name, ResourceTable};
use crate::error::HandlerError;
use crate::events::{Event, Payload};

/// Result of a tile's start hook.
pub enum StartOutcome {
    /// Started synchronously.
    Ready,
    /// Started once the future resolves; it runs on the tokio runtime.
    Pending(BoxFuture<'static, Result<(), HandlerError>>),
    /// The behavior signals readiness later through [`TileContext::set_ready`].
    Deferred,
}

impl std::fmt::Debug for StartOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StartOutcome::Ready => "Ready",
            StartOutcome::Pending(_) => "Pending",
            StartOutcome::Deferred => "Deferred",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum Readiness {
    #[default]
    Pending,
    Ready,
    Failed(Arc<str>),
}

/// What a [`TileBehavior`] may do while handling one event.
pub struct TileContext<'a, 'c> {
    core: &'a mut Context<'c>,
    readiness: &'a mut Readiness,
}

impl<'a, 'c> TileContext<'a, 'c> {
    pub(crate) fn new(core: &'a mut Context<'c>, readiness: &'a mut Readiness) -> Self {
        Self { core, readiness }
    }

    /// Name of the tile.
    pub fn name(&self) -> &Name {
        self.core.name()
    }

    /// The tile's coordinator.
    pub fn coordinator(&self) -> &Coordinator {
        self.core.coordinator()
    }

    /// Marks the behavior ready; the tile reports `UP` once its children are.
    pub fn set_ready(&mut self) {
        *self.readiness = Readiness::Ready;
    }

    /// Marks the behavior busy; the tile reports `DOWN` until ready again.
    pub fn set_pending(&mut self) {
        *self.readiness = Readiness::Pending;
    }

    /// Reports `ERROR` without stopping; cleared by the next `set_ready`/`set_pending`.
    pub fn fail(&mut self, reason: impl Into<Arc<str>>) {
        *self.readiness = Readiness::Failed(reason.into());
    }

    /// Whether the behavior is currently ready.
    pub fn is_ready(&self) -> bool {
        matches!(self.readiness, Readiness::Ready)
    }

    /// Runs `fut` on the tokio runtime and posts its output back to this tile
    /// as a custom event, delivered to [`TileBehavior::on_custom`].
    pub fn spawn_and_post<F, T>(&self, fut: F)
    where
        F: Future<Output = T> + Send + 'static,
        T: Any + Send + Sync,
    {
        let coordinator = self.core.coordinator().clone();
        tokio::spawn(async move {
            let output = fut.await;
            coordinator.post_event(Event::custom(output));
        });
    }

    /// Resources released when the tile stops or closes.
    pub fn resources(&mut self) -> &mut ResourceTable {
        self.core.resources()
    }

    /// Full coordinator context (timers, registrations, status).
    pub fn core(&mut self) -> &mut Context<'c> {
        &mut *self.core
    }
}

/// Hooks of a tile. Every method has a no-op default.
#[allow(unused_variables)]
pub trait TileBehavior: Send + 'static {
    /// Called each time the tile leaves `Created`/`Stopped*` for `Started`.
    fn on_start(&mut self, ctx: &mut TileContext<'_, '_>) -> Result<StartOutcome, HandlerError> {
        Ok(StartOutcome::Ready)
    }

    /// Called on every stop, before resources are released. Errors are logged only.
    fn on_stop(&mut self, ctx: &mut TileContext<'_, '_>) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Application payloads, timer events and [`TileContext::spawn_and_post`] outputs.
    fn on_custom(
        &mut self,
        payload: &Payload,
        ctx: &mut TileContext<'_, '_>,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Inspects a failure; return `true` to mark it handled and keep running.
    fn on_error(&mut self, cause: &HandlerError, ctx: &mut TileContext<'_, '_>) -> bool {
        false
    }

    /// Called once when the tile is closed.
    fn on_close(&mut self) {}
}

/// Behavior of a pure composite tile: ready as soon as it starts.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBehavior;

impl TileBehavior for NoopBehavior {}

/// Closure-backed leaf behavior.
///
/// ## Example
/// ```rust
/// use tilevisor::{LeafFn, ResourceFn, StartOutcome};
///
/// let leaf = LeafFn::new(|ctx| {
///     ctx.resources().keep("listener", || Ok(ResourceFn::new(|| Ok(()))))?;
///     Ok(StartOutcome::Ready)
/// });
/// # let _ = leaf;
/// ```
pub struct LeafFn<S> {
    start: S,
}

impl<S> LeafFn<S>
where
    S: FnMut(&mut TileContext<'_, '_>) -> Result<StartOutcome, HandlerError> + Send + 'static,
{
    /// Wraps a start hook.
    pub fn new(start: S) -> Self {
        Self { start }
    }
}

impl<S> TileBehavior for LeafFn<S>
where
    S: FnMut(&mut TileContext<'_, '_>) -> Result<StartOutcome, HandlerError> + Send + 'static,
{
    fn on_start(&mut self, ctx: &mut TileContext<'_, '_>) -> Result<StartOutcome, HandlerError> {
        (self.start)(ctx)
    }
}
