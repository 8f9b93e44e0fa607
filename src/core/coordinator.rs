//! # Coordinator: public handle of one supervised node.
//!
//! A [`Coordinator`] wraps a private mailbox drained by a single worker task
//! (see [`processor`](super::processor)). The handle is cheap to clone and can
//! be used from any thread; it never touches the node's state directly.
//!
//! ## Architecture
//! ```text
//! Coordinator (handle, cloneable)
//!   ├─► post_event / start / stop / set_timer ──► mpsc mailbox ──► worker ──► LifecycleProcessor
//!   ├─► status() / subscribe_status()          ◄── watch channel ◄── worker (publishes)
//!   └─► follow_status_changes()                ──► Registration ──► TrackRegistration to followed
//! ```
//!
//! ## Rules
//! - `start`/`stop` post at most one `Start`/`Stop` per transition.
//! - `post_event` on a closed coordinator is ignored, never fails.
//! - After `close`, `start`/`stop`/timers/registrations fail with [`CoordinatorError::Closed`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::core::handler::EventHandler;
use crate::core::processor::{LifecycleProcessor, drive};
use crate::core::{LifecycleRegistry, Name, Registration};
use crate::error::CoordinatorError;
use crate::events::{Event, Status, TimerFactory, TimerKey};

/// Receiving end of a coordinator's mailbox.
pub(crate) type Mailbox = mpsc::UnboundedReceiver<Event>;

pub(crate) struct Shared {
    name: Name,
    batch_size: usize,
    tx: mpsc::UnboundedSender<Event>,
    status: watch::Sender<Status>,
    /// Last transition requested through the handle (true = started).
    requested: AtomicBool,
    closed: AtomicBool,
    terminated: CancellationToken,
    registry: Arc<LifecycleRegistry>,
}

/// Handle to a lifecycle coordinator.
#[derive(Clone)]
pub struct Coordinator {
    shared: Arc<Shared>,
}

impl Coordinator {
    /// Creates a coordinator and spawns its worker on the current tokio runtime.
    ///
    /// Fails if `batch_size` is zero or another live coordinator already uses `name`.
    pub fn new<H: EventHandler>(
        name: impl Into<Name>,
        batch_size: usize,
        handler: H,
        registry: &Arc<LifecycleRegistry>,
    ) -> Result<Self, CoordinatorError> {
        let (coordinator, mailbox) = Self::create(name.into(), batch_size, registry)?;
        let processor = LifecycleProcessor::new(coordinator.clone(), Box::new(handler));
        tokio::spawn(drive(processor, mailbox));
        Ok(coordinator)
    }

    /// Creates the handle and its mailbox without spawning a worker.
    pub(crate) fn create(
        name: Name,
        batch_size: usize,
        registry: &Arc<LifecycleRegistry>,
    ) -> Result<(Self, Mailbox), CoordinatorError> {
        if batch_size == 0 {
            return Err(CoordinatorError::InvalidBatchSize { batch_size });
        }
        let (tx, mailbox) = mpsc::unbounded_channel();
        let (status, _) = watch::channel(Status::Down);
        let coordinator = Self {
            shared: Arc::new(Shared {
                name,
                batch_size,
                tx,
                status,
                requested: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                terminated: CancellationToken::new(),
                registry: Arc::clone(registry),
            }),
        };
        registry.insert(&coordinator)?;
        Ok((coordinator, mailbox))
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn upgrade(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    /// Returns the coordinator name.
    pub fn name(&self) -> &Name {
        &self.shared.name
    }

    /// Returns the configured batch size.
    pub fn batch_size(&self) -> usize {
        self.shared.batch_size
    }

    /// Returns the last published status.
    pub fn status(&self) -> Status {
        *self.shared.status.borrow()
    }

    /// Returns a receiver observing every published status.
    pub fn subscribe_status(&self) -> watch::Receiver<Status> {
        self.shared.status.subscribe()
    }

    /// Whether the last lifecycle request was a start.
    ///
    /// Cleared by `stop()` and by stops the node issues itself (unhandled errors,
    /// [`Context::stop`](crate::Context::stop)).
    pub fn is_started(&self) -> bool {
        self.shared.requested.load(AtomicOrdering::Acquire)
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(AtomicOrdering::Acquire)
    }

    /// Registry this coordinator reports to.
    pub fn registry(&self) -> &Arc<LifecycleRegistry> {
        &self.shared.registry
    }

    /// Enqueues an event. Ignored once the coordinator is closed.
    pub fn post_event(&self, event: Event) {
        if self.is_closed() {
            trace!(
                coordinator = %self.name(),
                event = event.as_label(),
                "ignoring event posted to closed coordinator"
            );
            return;
        }
        let _ = self.shared.tx.send(event);
    }

    /// Requests a start. Posts `Start` only if the last request was not a start.
    pub fn start(&self) -> Result<(), CoordinatorError> {
        self.ensure_open()?;
        if self
            .shared
            .requested
            .compare_exchange(false, true, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
            .is_ok()
        {
            self.post_event(Event::Start);
        }
        Ok(())
    }

    /// Requests a stop. Posts `Stop` only if the last request was a start.
    pub fn stop(&self) -> Result<(), CoordinatorError> {
        self.ensure_open()?;
        if self
            .shared
            .requested
            .compare_exchange(true, false, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
            .is_ok()
        {
            self.post_event(Event::Stop { errored: false });
        }
        Ok(())
    }

    /// Schedules `factory()` to be delivered after `delay`, replacing any timer under `key`.
    ///
    /// Silently ignored by the worker while the coordinator is not running.
    pub fn set_timer<F>(
        &self,
        key: impl Into<TimerKey>,
        delay: Duration,
        factory: F,
    ) -> Result<(), CoordinatorError>
    where
        F: FnOnce() -> Event + Send + 'static,
    {
        self.ensure_open()?;
        self.post_event(Event::SetTimer {
            key: key.into(),
            delay,
            factory: TimerFactory::new(factory),
        });
        Ok(())
    }

    /// Cancels the timer under `key`, if any.
    pub fn cancel_timer(&self, key: impl Into<TimerKey>) -> Result<(), CoordinatorError> {
        self.ensure_open()?;
        self.post_event(Event::CancelTimer { key: key.into() });
        Ok(())
    }

    /// Follows the aggregated status of `coordinators`.
    ///
    /// The returned registration delivers [`Event::RegistrationStatusChange`] to
    /// this coordinator; closing it unsubscribes.
    pub fn follow_status_changes(
        &self,
        coordinators: &[Coordinator],
    ) -> Result<Registration, CoordinatorError> {
        let registration = self.new_registration(coordinators)?;
        self.post_event(Event::NewRegistration(registration.clone()));
        registration.notify_current_status();
        Self::track(&registration);
        Ok(registration)
    }

    /// Like [`follow_status_changes`](Self::follow_status_changes), resolving names through the registry.
    ///
    /// Fails fast on the first unknown name.
    pub fn follow_status_changes_by_name(
        &self,
        names: &[Name],
    ) -> Result<Registration, CoordinatorError> {
        let coordinators = self.resolve(names)?;
        self.follow_status_changes(&coordinators)
    }

    /// Stops (if running) and permanently closes the coordinator. Idempotent.
    pub fn close(&self) {
        if self.shared.closed.swap(true, AtomicOrdering::AcqRel) {
            return;
        }
        let _ = self.shared.tx.send(Event::Close);
    }

    /// Completes once the worker has processed `Close` and exited.
    pub async fn terminated(&self) {
        self.shared.terminated.cancelled().await;
    }

    fn ensure_open(&self) -> Result<(), CoordinatorError> {
        if self.is_closed() {
            return Err(CoordinatorError::Closed {
                name: self.name().clone(),
            });
        }
        Ok(())
    }

    /// Validates and builds a registration owned by this coordinator.
    pub(crate) fn new_registration(
        &self,
        coordinators: &[Coordinator],
    ) -> Result<Registration, CoordinatorError> {
        self.ensure_open()?;
        if coordinators.iter().any(|c| c.name() == self.name()) {
            return Err(CoordinatorError::SelfRegistration {
                name: self.name().clone(),
            });
        }
        Ok(Registration::new(self.clone(), coordinators.to_vec()))
    }

    /// Asks every followed coordinator to start notifying `registration`.
    pub(crate) fn track(registration: &Registration) {
        for followed in registration.followed_coordinators() {
            followed.post_event(Event::TrackRegistration(registration.clone()));
        }
    }

    pub(crate) fn resolve(&self, names: &[Name]) -> Result<Vec<Coordinator>, CoordinatorError> {
        names
            .iter()
            .map(|name| {
                self.registry()
                    .get_coordinator(name.as_str())
                    .ok_or_else(|| CoordinatorError::UnknownCoordinator { name: name.clone() })
            })
            .collect()
    }

    /// Clears a pending start request on behalf of a stop the worker issued itself.
    ///
    /// Only the handle sets the flag; the worker may only withdraw it, and only
    /// if no `stop()` already did.
    pub(crate) fn withdraw_start(&self) {
        let _ = self.shared.requested.compare_exchange(
            true,
            false,
            AtomicOrdering::AcqRel,
            AtomicOrdering::Acquire,
        );
    }

    pub(crate) fn publish_status(&self, status: Status) {
        self.shared.status.send_replace(status);
    }

    pub(crate) fn mark_terminated(&self) {
        self.shared.terminated.cancel();
    }
}

impl PartialEq for Coordinator {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for Coordinator {}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("name", self.name())
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}
