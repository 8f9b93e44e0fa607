//! # Per-coordinator mutable state.
//!
//! Everything here is owned by exactly one worker; nothing is shared, so no
//! field needs synchronisation.

use std::collections::{BTreeMap, VecDeque};

use crate::core::resources::ResourceTable;
use crate::core::timers::Timers;
use crate::core::{Registration, RegistrationId};
use crate::events::{Event, Status};

/// Node-local state of a coordinator.
#[derive(Default)]
pub(crate) struct NodeState {
    /// Started and processing events. Independent of `status`.
    pub(crate) running: bool,
    /// Last status this node set.
    pub(crate) status: Status,
    /// `Close` has been processed.
    pub(crate) closed: bool,
    /// Events waiting in the current batch (front = next).
    pub(crate) pending: VecDeque<Event>,
    /// Events synthesised by the handler, moved to the front of `pending` after it returns.
    pub(crate) synthesized: Vec<Event>,
    /// Active timers.
    pub(crate) timers: Timers,
    /// Registrations created by this coordinator.
    pub(crate) owned: BTreeMap<RegistrationId, Registration>,
    /// Registrations following this coordinator.
    pub(crate) tracked: BTreeMap<RegistrationId, Registration>,
    /// Managed resources, released on stop and close.
    pub(crate) resources: ResourceTable,
}

impl NodeState {
    /// Moves handler-synthesised events to the front of the batch, preserving their order.
    pub(crate) fn flush_synthesized(&mut self) {
        for event in self.synthesized.drain(..).rev() {
            self.pending.push_front(event);
        }
    }
}
