//! # Events consumed by a coordinator's mailbox.
//!
//! The [`Event`] enum classifies everything a coordinator processes across three groups:
//! - **Lifecycle events**: `Start`, `Stop`, `Error`, `Close`
//! - **Health/application events**: `RegistrationStatusChange`, `Custom`, fired `Timer`s
//! - **Bookkeeping events**: timer scheduling and registration tracking, owned by the framework
//!
//! Bookkeeping events are consumed by the processor and never reach the user handler.
//! Application payloads travel as [`Payload`] inside [`Event::Custom`].
//!
//! ## Example
//! ```rust
//! use tilevisor::{Event, Status};
//!
//! #[derive(Debug, PartialEq)]
//! struct Ping(u32);
//!
//! let ev = Event::custom(Ping(7));
//! assert_eq!(ev.payload::<Ping>(), Some(&Ping(7)));
//! assert_eq!(ev.as_label(), "custom");
//! assert!(Status::Up.is_up());
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{Registration, RegistrationId};
use crate::error::HandlerError;

/// Health of a coordinator.
///
/// `Down` is both the initial and the normal "not currently healthy" state,
/// `Error` needs an explicit restart to clear, `Up` means the node and
/// everything it depends on is healthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    /// Not currently healthy (initial state).
    #[default]
    Down,
    /// Healthy.
    Up,
    /// Failed; stays failed until restarted.
    Error,
}

impl Status {
    /// Returns `true` for [`Status::Up`].
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Status::Up)
    }

    /// Returns `true` for [`Status::Error`].
    #[inline]
    pub fn is_error(self) -> bool {
        matches!(self, Status::Error)
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            Status::Down => "down",
            Status::Up => "up",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Down => "DOWN",
            Status::Up => "UP",
            Status::Error => "ERROR",
        })
    }
}

/// Key identifying a timer within one coordinator.
pub type TimerKey = String;

/// Opaque, cheaply cloneable application payload.
///
/// Payloads are shared (`Arc`) so that one value can be broadcast to every
/// follower of a coordinator.
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Returns the value if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Returns `true` if the value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Type name of the wrapped value (diagnostics only).
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Payload").field(&self.type_name).finish()
    }
}

/// Produces the event delivered when a timer fires.
///
/// Invoked on the timer facility at fire time, never on the coordinator worker.
pub struct TimerFactory(Box<dyn FnOnce() -> Event + Send>);

impl TimerFactory {
    /// Wraps a closure producing the fired event.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Event + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub(crate) fn produce(self) -> Event {
        (self.0)()
    }
}

impl fmt::Debug for TimerFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TimerFactory")
    }
}

/// A value consumed by exactly one coordinator's queue, in FIFO order.
#[non_exhaustive]
#[derive(Debug)]
pub enum Event {
    /// Start the coordinator (the only event processed while not running).
    Start,

    /// Stop the coordinator; `errored` leaves its status at [`Status::Error`].
    Stop {
        /// Stop caused by an unhandled error.
        errored: bool,
    },

    /// A handler failed. The handler sets `handled` to keep the coordinator running.
    Error {
        /// What failed.
        cause: HandlerError,
        /// Set by the handler to acknowledge the failure.
        handled: bool,
    },

    /// The aggregate status of a registration owned by this coordinator changed.
    RegistrationStatusChange {
        /// Which registration changed.
        registration: RegistrationId,
        /// The new aggregate.
        status: Status,
    },

    /// Application payload; `origin` is set when forwarded through a registration.
    Custom {
        /// Registration the payload arrived through, if any.
        origin: Option<RegistrationId>,
        /// The payload itself.
        payload: Payload,
    },

    /// Schedule a timer (bookkeeping).
    SetTimer {
        /// Timer key; replaces any timer under the same key.
        key: TimerKey,
        /// Delay before the timer fires.
        delay: Duration,
        /// Produces the delivered event.
        factory: TimerFactory,
    },

    /// Cancel a timer (bookkeeping).
    CancelTimer {
        /// Timer key.
        key: TimerKey,
    },

    /// A timer fired. Dropped silently if the timer was cancelled or replaced.
    Timer {
        /// Timer key.
        key: TimerKey,
        /// Scheduling generation, compared against the live timer.
        generation: u64,
        /// The event produced by the timer's factory.
        event: Box<Event>,
    },

    /// A registration created by this coordinator (bookkeeping).
    NewRegistration(Registration),

    /// A registration created by this coordinator was closed (bookkeeping).
    CancelRegistration(RegistrationId),

    /// Start notifying `registration` of this coordinator's status (bookkeeping).
    TrackRegistration(Registration),

    /// Stop notifying a registration (bookkeeping).
    StopTrackingRegistration(RegistrationId),

    /// Close the coordinator permanently.
    Close,
}

impl Event {
    /// Builds an [`Event::Custom`] without an origin registration.
    pub fn custom<T: Any + Send + Sync>(value: T) -> Self {
        Event::Custom {
            origin: None,
            payload: Payload::new(value),
        }
    }

    /// Builds an unhandled [`Event::Error`].
    pub fn error(cause: HandlerError) -> Self {
        Event::Error {
            cause,
            handled: false,
        }
    }

    /// Returns the custom payload if this is an [`Event::Custom`] carrying a `T`.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        match self {
            Event::Custom { payload, .. } => payload.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Marks an [`Event::Error`] as handled. No-op for other variants.
    pub fn mark_handled(&mut self) {
        if let Event::Error { handled, .. } = self {
            *handled = true;
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::Stop { .. } => "stop",
            Event::Error { .. } => "error",
            Event::RegistrationStatusChange { .. } => "registration_status_change",
            Event::Custom { .. } => "custom",
            Event::SetTimer { .. } => "set_timer",
            Event::CancelTimer { .. } => "cancel_timer",
            Event::Timer { .. } => "timer",
            Event::NewRegistration(_) => "new_registration",
            Event::CancelRegistration(_) => "cancel_registration",
            Event::TrackRegistration(_) => "track_registration",
            Event::StopTrackingRegistration(_) => "stop_tracking_registration",
            Event::Close => "close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_payload_downcasts_only_to_its_type() {
        let ev = Event::custom(42u32);
        assert_eq!(ev.payload::<u32>(), Some(&42));
        assert_eq!(ev.payload::<String>(), None);
        assert_eq!(Event::Start.payload::<u32>(), None);
    }

    #[test]
    fn mark_handled_only_touches_error_events() {
        let mut ev = Event::error(HandlerError::fail("x"));
        ev.mark_handled();
        assert!(matches!(ev, Event::Error { handled: true, .. }));

        let mut start = Event::Start;
        start.mark_handled();
        assert!(matches!(start, Event::Start));
    }

    #[test]
    fn status_defaults_to_down() {
        assert_eq!(Status::default(), Status::Down);
        assert_eq!(Status::Error.to_string(), "ERROR");
    }
}
