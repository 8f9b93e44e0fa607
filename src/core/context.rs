//! # Handler context: what an [`EventHandler`](crate::EventHandler) may do during one event.
//!
//! A [`Context`] borrows the node state for the duration of a single
//! `on_event` call. Requests made through it are either applied directly to
//! the node (status, resources, registrations) or synthesised as follow-up
//! events that run right after the current one (`stop`, `stop_with_error`).

use std::time::Duration;

use tracing::{debug, trace};

use crate::core::resources::ResourceTable;
use crate::core::state::NodeState;
use crate::core::{Coordinator, Name, Registration, RegistrationId};
use crate::error::CoordinatorError;
use crate::events::{Event, Payload, Status, TimerFactory, TimerKey};

/// Mutable view of a coordinator while its handler runs.
pub struct Context<'a> {
    pub(crate) state: &'a mut NodeState,
    pub(crate) coordinator: &'a Coordinator,
}

/// Sets `status` and propagates it to the watch channel, tracked registrations and the registry.
pub(crate) fn publish_status(
    state: &mut NodeState,
    coordinator: &Coordinator,
    status: Status,
    reason: &str,
) {
    state.status = status;
    coordinator.publish_status(status);
    for registration in state.tracked.values() {
        registration.update_coordinator_status(coordinator.name(), status);
    }
    coordinator
        .registry()
        .update_status(coordinator.name(), status, reason);
}

impl<'a> Context<'a> {
    pub(crate) fn new(state: &'a mut NodeState, coordinator: &'a Coordinator) -> Self {
        Self { state, coordinator }
    }

    /// Name of the coordinator being driven.
    pub fn name(&self) -> &Name {
        self.coordinator.name()
    }

    /// Handle to the coordinator being driven.
    pub fn coordinator(&self) -> &Coordinator {
        self.coordinator
    }

    /// Current status of this node.
    pub fn status(&self) -> Status {
        self.state.status
    }

    /// Whether the node is started.
    pub fn is_running(&self) -> bool {
        self.state.running
    }

    /// Updates this node's status.
    ///
    /// Ignored while the node is not running; a no-op when `status` is unchanged.
    pub fn update_status(&mut self, status: Status, reason: &str) {
        if !self.state.running {
            debug!(
                coordinator = %self.name(),
                status = %status,
                "status update ignored while stopped"
            );
            return;
        }
        if self.state.status == status {
            return;
        }
        publish_status(self.state, self.coordinator, status, reason);
    }

    /// Enqueues an event at the back of this coordinator's mailbox.
    pub fn post_event(&self, event: Event) {
        self.coordinator.post_event(event);
    }

    /// Stops this node right after the current event.
    pub fn stop(&mut self) {
        self.coordinator.withdraw_start();
        self.state.synthesized.push(Event::Stop { errored: false });
    }

    /// Stops this node with an error right after the current event.
    pub fn stop_with_error(&mut self) {
        self.coordinator.withdraw_start();
        self.state.synthesized.push(Event::Stop { errored: true });
    }

    /// Schedules `factory()` after `delay`, replacing any timer under `key`.
    ///
    /// Ignored while the node is not running.
    pub fn set_timer<F>(&mut self, key: impl Into<TimerKey>, delay: Duration, factory: F)
    where
        F: FnOnce() -> Event + Send + 'static,
    {
        let key = key.into();
        if !self.state.running {
            trace!(coordinator = %self.name(), timer = %key, "timer ignored while stopped");
            return;
        }
        self.state
            .timers
            .schedule(key, delay, TimerFactory::new(factory), self.coordinator.clone());
    }

    /// Cancels the timer under `key`. Returns `true` if one was active.
    pub fn cancel_timer(&mut self, key: &str) -> bool {
        self.state.timers.cancel(key)
    }

    /// Whether a timer under `key` is active.
    pub fn has_timer(&self, key: &str) -> bool {
        self.state.timers.contains(key)
    }

    /// Follows the aggregated status of `coordinators` from inside the handler.
    ///
    /// The registration is owned by this node immediately and closed when it closes.
    pub fn follow_status_changes(
        &mut self,
        coordinators: &[Coordinator],
    ) -> Result<Registration, CoordinatorError> {
        let registration = self.coordinator.new_registration(coordinators)?;
        self.state
            .owned
            .insert(registration.id(), registration.clone());
        registration.notify_current_status();
        Coordinator::track(&registration);
        Ok(registration)
    }

    /// Like [`follow_status_changes`](Self::follow_status_changes), resolving names through the registry.
    pub fn follow_status_changes_by_name(
        &mut self,
        names: &[Name],
    ) -> Result<Registration, CoordinatorError> {
        let coordinators = self.coordinator.resolve(names)?;
        self.follow_status_changes(&coordinators)
    }

    /// Registration owned by this node, if still open.
    pub fn registration(&self, id: RegistrationId) -> Option<&Registration> {
        self.state.owned.get(&id)
    }

    /// Sends `payload` to every coordinator following this one.
    pub fn post_custom_event_to_followers(&self, payload: Payload) {
        for registration in self.state.tracked.values() {
            registration.post_custom_event(payload.clone());
        }
    }

    /// Number of registrations following this node.
    pub fn follower_count(&self) -> usize {
        self.state.tracked.len()
    }

    /// Resources scoped to the current run. Released on stop and close.
    pub fn resources(&mut self) -> &mut ResourceTable {
        &mut self.state.resources
    }
}
