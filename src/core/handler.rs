//! # Event handler abstraction and closure-backed implementation.
//!
//! This module defines the [`EventHandler`] trait (synchronous, runs on the
//! coordinator's worker) and a convenient closure-backed implementation [`HandlerFn`].
//!
//! A handler receives each event **mutably** (so it can mark an
//! [`Event::Error`] handled) together with a [`Context`] exposing the
//! coordinator's node-local state.
//!
//! ## Rules
//! - Handlers must not block for long periods: they share one worker with every
//!   other event of the same coordinator.
//! - Returning `Err` is recoverable by default: the processor re-delivers the
//!   failure as an [`Event::Error`] within the same batch.

use crate::core::context::Context;
use crate::error::HandlerError;
use crate::events::Event;

/// # User-supplied event handling logic.
///
/// # Example
/// ```
/// use tilevisor::{Context, Event, EventHandler, HandlerError, Status};
///
/// struct AlwaysUp;
///
/// impl EventHandler for AlwaysUp {
///     fn on_event(&mut self, event: &mut Event, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
///         if let Event::Start = event {
///             ctx.update_status(Status::Up, "started");
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait EventHandler: Send + 'static {
    /// Processes one event on the coordinator's worker.
    fn on_event(&mut self, event: &mut Event, ctx: &mut Context<'_>) -> Result<(), HandlerError>;
}

/// Closure-backed handler.
///
/// Wraps an `FnMut(&mut Event, &mut Context) -> Result<(), HandlerError>`.
///
/// ## Example
/// ```rust
/// use tilevisor::{Event, HandlerFn};
///
/// let handler = HandlerFn::new(|event, _ctx| {
///     if let Event::Error { .. } = event {
///         event.mark_handled();
///     }
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F>
where
    F: FnMut(&mut Event, &mut Context<'_>) -> Result<(), HandlerError> + Send + 'static,
{
    /// Creates a new closure-backed handler.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> EventHandler for HandlerFn<F>
where
    F: FnMut(&mut Event, &mut Context<'_>) -> Result<(), HandlerError> + Send + 'static,
{
    fn on_event(&mut self, event: &mut Event, ctx: &mut Context<'_>) -> Result<(), HandlerError> {
        (self.f)(event, ctx)
    }
}
