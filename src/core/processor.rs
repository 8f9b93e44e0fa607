//! # LifecycleProcessor: the single-threaded event loop of one coordinator.
//!
//! The processor owns the handler and the [`NodeState`]; it is driven by
//! exactly one worker task ([`drive`]) that drains the coordinator mailbox in
//! batches of at most `batch_size` events.
//!
//! ## Architecture
//! ```text
//! mailbox ──recv_many(batch)──► pending (VecDeque) ──► process_event()
//!                                  ▲                      │
//!                                  │  push_front          ├─► bookkeeping (timers, registrations)
//!                                  └── Error / Stop ◄─────┼─► Start / Stop / Close
//!                                      (synthesised)      └─► handler.on_event()
//! ```
//!
//! ## Rules
//! - Bookkeeping events and `Close` are always processed; `Start` only while stopped;
//!   everything else is dropped while the node is not running.
//! - A failing handler gets its failure back as [`Event::Error`] **before** the next
//!   queued event of the same batch.
//! - An `Error` nobody marks handled stops the node with status `Error`; the batch
//!   still processes the remaining events and reports [`BatchError::Unhandled`].
//! - A handler failing while handling an already-handled `Error` escalates: the batch
//!   ends immediately with [`BatchError::Escalated`], leftovers stay pending.
//! - Handler failures during `Stop`/`Close` are logged, never re-delivered.
//! - A panicking handler is treated as a failing one.

use std::panic::AssertUnwindSafe;

use tracing::{debug, error, trace, warn};

use crate::core::context::{Context, publish_status};
use crate::core::coordinator::Mailbox;
use crate::core::handler::EventHandler;
use crate::core::state::NodeState;
use crate::core::{Coordinator, Name};
use crate::error::{BatchError, HandlerError};
use crate::events::{Event, Status};

/// Event loop state of one coordinator.
pub(crate) struct LifecycleProcessor {
    coordinator: Coordinator,
    handler: Box<dyn EventHandler>,
    state: NodeState,
}

impl LifecycleProcessor {
    pub(crate) fn new(coordinator: Coordinator, handler: Box<dyn EventHandler>) -> Self {
        Self {
            coordinator,
            handler,
            state: NodeState::default(),
        }
    }

    pub(crate) fn name(&self) -> &Name {
        self.coordinator.name()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.closed
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.state.pending.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.state.running
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> Status {
        self.state.status
    }

    /// Processes `incoming` after whatever is still pending from a previous batch.
    pub(crate) fn process_batch<I>(&mut self, incoming: I) -> Result<(), BatchError>
    where
        I: IntoIterator<Item = Event>,
    {
        self.state.pending.extend(incoming);

        let mut outcome = Ok(());
        while let Some(event) = self.state.pending.pop_front() {
            match self.process_event(event) {
                Ok(()) => {}
                Err(err @ BatchError::Escalated { .. }) => return Err(err),
                Err(err) => {
                    if outcome.is_ok() {
                        outcome = Err(err);
                    }
                }
            }
            if self.state.closed {
                if !self.state.pending.is_empty() {
                    trace!(
                        coordinator = %self.name(),
                        dropped = self.state.pending.len(),
                        "dropping events queued behind close"
                    );
                }
                self.state.pending.clear();
                break;
            }
        }
        outcome
    }

    fn process_event(&mut self, event: Event) -> Result<(), BatchError> {
        match event {
            Event::Timer {
                key,
                generation,
                event,
            } => {
                if !self.state.timers.take_fired(&key, generation) {
                    trace!(coordinator = %self.name(), timer = %key, "dropping stale timer fire");
                    return Ok(());
                }
                self.process_event(*event)
            }
            Event::SetTimer {
                key,
                delay,
                factory,
            } => {
                if self.state.running {
                    self.state
                        .timers
                        .schedule(key, delay, factory, self.coordinator.clone());
                } else {
                    debug!(
                        coordinator = %self.name(),
                        timer = %key,
                        "timer rejected while stopped"
                    );
                }
                Ok(())
            }
            Event::CancelTimer { key } => {
                self.state.timers.cancel(&key);
                Ok(())
            }
            Event::NewRegistration(registration) => {
                self.state.owned.insert(registration.id(), registration);
                Ok(())
            }
            Event::CancelRegistration(id) => {
                self.state.owned.remove(&id);
                Ok(())
            }
            Event::TrackRegistration(registration) => {
                registration.update_coordinator_status(self.coordinator.name(), self.state.status);
                self.state.tracked.insert(registration.id(), registration);
                Ok(())
            }
            Event::StopTrackingRegistration(id) => {
                self.state.tracked.remove(&id);
                Ok(())
            }
            Event::Close => {
                self.close();
                Ok(())
            }
            Event::Start => self.start(),
            event if !self.state.running => {
                trace!(
                    coordinator = %self.name(),
                    event = event.as_label(),
                    "dropping event while stopped"
                );
                Ok(())
            }
            Event::Stop { errored } => {
                self.stop(errored);
                Ok(())
            }
            event => self.deliver(event),
        }
    }

    /// Runs the handler on `event`, then moves synthesised events to the front of the batch.
    fn invoke(&mut self, event: &mut Event) -> Result<(), HandlerError> {
        let mut ctx = Context::new(&mut self.state, &self.coordinator);
        let handler = &mut self.handler;
        let result =
            std::panic::catch_unwind(AssertUnwindSafe(|| handler.on_event(event, &mut ctx)))
                .unwrap_or_else(|panic| Err(HandlerError::fail(panic_message(panic.as_ref()))));
        self.state.flush_synthesized();
        result
    }

    fn deliver(&mut self, mut event: Event) -> Result<(), BatchError> {
        let result = self.invoke(&mut event);
        match (result, event) {
            (Ok(()), Event::Error { cause, handled: false }) => Err(self.unhandled(cause)),
            (Ok(()), _) => Ok(()),
            (Err(cause), Event::Error { handled: true, .. }) => {
                error!(
                    coordinator = %self.name(),
                    error = %cause,
                    "handler failed while handling an error"
                );
                self.coordinator.withdraw_start();
                self.state.pending.push_front(Event::Stop { errored: true });
                Err(BatchError::Escalated {
                    name: self.name().clone(),
                    cause,
                })
            }
            (Err(failure), Event::Error { cause, handled: false }) => {
                warn!(
                    coordinator = %self.name(),
                    error = %failure,
                    "handler failed on unhandled error"
                );
                Err(self.unhandled(cause))
            }
            (Err(cause), event) => {
                debug!(
                    coordinator = %self.name(),
                    event = event.as_label(),
                    error = %cause,
                    "handler failed; delivering error"
                );
                self.state.pending.push_front(Event::error(cause));
                Ok(())
            }
        }
    }

    fn unhandled(&mut self, cause: HandlerError) -> BatchError {
        warn!(
            coordinator = %self.name(),
            error = %cause,
            label = cause.as_label(),
            "unhandled error; stopping"
        );
        self.coordinator.withdraw_start();
        self.state.pending.push_front(Event::Stop { errored: true });
        BatchError::Unhandled {
            name: self.name().clone(),
            cause,
        }
    }

    fn start(&mut self) -> Result<(), BatchError> {
        if self.state.running {
            trace!(coordinator = %self.name(), "already running");
            return Ok(());
        }
        debug!(coordinator = %self.name(), "starting");
        self.state.running = true;
        self.state.status = Status::Down;
        self.coordinator.publish_status(Status::Down);

        let outcome = self.deliver(Event::Start);

        let status = self.state.status;
        for registration in self.state.tracked.values() {
            registration.update_coordinator_status(self.coordinator.name(), status);
        }
        for registration in self.state.owned.values() {
            registration.notify_current_status();
        }
        self.coordinator
            .registry()
            .update_status(self.coordinator.name(), status, "started");
        outcome
    }

    fn stop(&mut self, errored: bool) {
        debug!(coordinator = %self.name(), errored, "stopping");
        if let Err(e) = self.invoke(&mut Event::Stop { errored }) {
            warn!(coordinator = %self.name(), error = %e, "handler failed during stop");
        }
        self.state.running = false;
        self.state.timers.cancel_all();
        self.state.resources.release_all();

        let (status, reason) = if errored {
            (Status::Error, "stopped with error")
        } else {
            (Status::Down, "stopped")
        };
        publish_status(&mut self.state, &self.coordinator, status, reason);
    }

    fn close(&mut self) {
        if self.state.closed {
            return;
        }
        debug!(coordinator = %self.name(), "closing");
        if self.state.running {
            self.stop(false);
        }
        self.state.timers.cancel_all();
        for registration in std::mem::take(&mut self.state.owned).into_values() {
            registration.close();
        }
        self.state.tracked.clear();
        self.state.resources.release_all();
        if let Err(e) = self.invoke(&mut Event::Close) {
            warn!(coordinator = %self.name(), error = %e, "handler failed during close");
        }
        self.state.closed = true;
        self.coordinator
            .registry()
            .remove_coordinator(self.coordinator.name().as_str());
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        format!("handler panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {msg}")
    } else {
        "handler panicked".to_string()
    }
}

/// Worker loop: drains the mailbox until `Close` has been processed.
pub(crate) async fn drive(mut processor: LifecycleProcessor, mut mailbox: Mailbox) {
    let batch_size = processor.coordinator.batch_size();
    let mut batch = Vec::with_capacity(batch_size);

    while !processor.is_closed() {
        if !processor.has_pending() && mailbox.recv_many(&mut batch, batch_size).await == 0 {
            break;
        }
        if let Err(e) = processor.process_batch(batch.drain(..)) {
            error!(
                coordinator = %processor.name(),
                error = %e,
                label = e.as_label(),
                "event batch failed"
            );
        }
    }

    if !processor.is_closed() {
        processor.close();
    }
    mailbox.close();
    debug!(coordinator = %processor.name(), "worker terminated");
    processor.coordinator.mark_terminated();
}
