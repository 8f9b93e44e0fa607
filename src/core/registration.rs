//! # Registration: aggregated health of a followed set of coordinators.
//!
//! A [`Registration`] is created by `follow_status_changes`. It remembers the
//! last known status of every followed coordinator and posts
//! [`Event::RegistrationStatusChange`] to the registering coordinator whenever
//! the aggregate changes.
//!
//! ## Aggregate
//! ```text
//! any member ERROR      → ERROR
//! every member UP       → UP
//! otherwise             → DOWN
//! ```
//!
//! ## Rules
//! - Reports that do not change the aggregate post nothing (de-duplicated).
//! - `notify_current_status` posts unconditionally, but only while open.
//! - `close` unsubscribes from every followed coordinator exactly once.
//!
//! Followed coordinators update the table from their own workers, so the table
//! sits behind a small lock; the event is posted while holding it so aggregate
//! changes reach the registering coordinator in the order they happened.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::{Coordinator, Name};
use crate::events::{Event, Payload, Status};

static REGISTRATION_SEQ: AtomicU64 = AtomicU64::new(1);

/// Identifier of a registration, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    fn next() -> Self {
        Self(REGISTRATION_SEQ.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "registration-{}", self.0)
    }
}

struct StatusTable {
    statuses: HashMap<Name, Status>,
    aggregate: Status,
    closed: bool,
}

struct Inner {
    id: RegistrationId,
    registering: Coordinator,
    followed: Vec<Coordinator>,
    table: Mutex<StatusTable>,
}

/// Subscription of one coordinator to the aggregated health of others.
///
/// Cloning yields another handle to the same registration.
#[derive(Clone)]
pub struct Registration {
    inner: Arc<Inner>,
}

/// Computes the aggregate of a set of member statuses.
pub(crate) fn aggregate<'a>(statuses: impl IntoIterator<Item = &'a Status>) -> Status {
    let mut all_up = true;
    for status in statuses {
        match status {
            Status::Error => return Status::Error,
            Status::Down => all_up = false,
            Status::Up => {}
        }
    }
    if all_up { Status::Up } else { Status::Down }
}

impl Registration {
    /// Creates a registration seeded with the last published status of each followed coordinator.
    pub(crate) fn new(registering: Coordinator, followed: Vec<Coordinator>) -> Self {
        let statuses: HashMap<Name, Status> = followed
            .iter()
            .map(|c| (c.name().clone(), c.status()))
            .collect();
        let aggregate = aggregate(statuses.values());
        Self {
            inner: Arc::new(Inner {
                id: RegistrationId::next(),
                registering,
                followed,
                table: Mutex::new(StatusTable {
                    statuses,
                    aggregate,
                    closed: false,
                }),
            }),
        }
    }

    fn table(&self) -> MutexGuard<'_, StatusTable> {
        self.inner.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the registration id.
    pub fn id(&self) -> RegistrationId {
        self.inner.id
    }

    /// Returns the current aggregate status.
    pub fn status(&self) -> Status {
        self.table().aggregate
    }

    /// Name of the coordinator receiving the aggregated events.
    pub fn registering(&self) -> &Name {
        self.inner.registering.name()
    }

    /// Names of the followed coordinators.
    pub fn followed(&self) -> Vec<Name> {
        self.inner.followed.iter().map(|c| c.name().clone()).collect()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.table().closed
    }

    pub(crate) fn followed_coordinators(&self) -> &[Coordinator] {
        &self.inner.followed
    }

    /// Records the status of one followed coordinator.
    ///
    /// Posts [`Event::RegistrationStatusChange`] only when the aggregate changes.
    /// Unknown members and closed registrations are ignored.
    pub fn update_coordinator_status(&self, which: &Name, status: Status) {
        let mut table = self.table();
        if table.closed {
            return;
        }
        match table.statuses.get_mut(which) {
            Some(entry) => *entry = status,
            None => return,
        }

        let next = aggregate(table.statuses.values());
        if next != table.aggregate {
            table.aggregate = next;
            self.inner.registering.post_event(Event::RegistrationStatusChange {
                registration: self.inner.id,
                status: next,
            });
        }
    }

    /// Posts the current aggregate unconditionally (while open).
    pub fn notify_current_status(&self) {
        let table = self.table();
        if table.closed {
            return;
        }
        self.inner.registering.post_event(Event::RegistrationStatusChange {
            registration: self.inner.id,
            status: table.aggregate,
        });
    }

    /// Forwards a payload to the registering coordinator without aggregation.
    pub fn post_custom_event(&self, payload: Payload) {
        if self.is_closed() {
            return;
        }
        self.inner.registering.post_event(Event::Custom {
            origin: Some(self.inner.id),
            payload,
        });
    }

    /// Unsubscribes from every followed coordinator. Idempotent.
    pub fn close(&self) {
        {
            let mut table = self.table();
            if table.closed {
                return;
            }
            table.closed = true;
        }
        for followed in &self.inner.followed {
            followed.post_event(Event::StopTrackingRegistration(self.inner.id));
        }
        self.inner
            .registering
            .post_event(Event::CancelRegistration(self.inner.id));
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("id", &self.inner.id)
            .field("registering", self.inner.registering.name())
            .field("followed", &self.followed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::core::LifecycleRegistry;
    use crate::core::test_support::{detached, drain};

    fn statuses(events: &[Event]) -> Vec<Status> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::RegistrationStatusChange { status, .. } => Some(*status),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn aggregate_is_up_only_when_every_member_is_up() {
        assert_eq!(aggregate(&[Status::Up, Status::Up]), Status::Up);
        assert_eq!(aggregate(&[Status::Up, Status::Down]), Status::Down);
        assert_eq!(aggregate(&[Status::Down, Status::Error]), Status::Error);
        let empty: [Status; 0] = [];
        assert_eq!(aggregate(&empty), Status::Up);
    }

    #[tokio::test]
    async fn duplicate_reports_post_nothing() {
        let registry = LifecycleRegistry::builder(Config::default()).build();
        let (owner, mut owner_rx) = detached(&registry, "owner");
        let (a, _a_rx) = detached(&registry, "a");
        let (b, _b_rx) = detached(&registry, "b");

        let reg = Registration::new(owner, vec![a.clone(), b.clone()]);
        reg.update_coordinator_status(a.name(), Status::Up);
        reg.update_coordinator_status(a.name(), Status::Up);
        reg.update_coordinator_status(b.name(), Status::Up);
        reg.update_coordinator_status(b.name(), Status::Up);
        reg.update_coordinator_status(a.name(), Status::Down);
        reg.update_coordinator_status(a.name(), Status::Down);

        assert_eq!(statuses(&drain(&mut owner_rx)), vec![Status::Up, Status::Down]);
    }

    #[tokio::test]
    async fn error_member_dominates_the_aggregate() {
        let registry = LifecycleRegistry::builder(Config::default()).build();
        let (owner, mut owner_rx) = detached(&registry, "owner");
        let (a, _a_rx) = detached(&registry, "a");
        let (b, _b_rx) = detached(&registry, "b");

        let reg = Registration::new(owner, vec![a.clone(), b.clone()]);
        reg.update_coordinator_status(a.name(), Status::Error);
        reg.update_coordinator_status(b.name(), Status::Up);
        reg.update_coordinator_status(a.name(), Status::Up);

        assert_eq!(statuses(&drain(&mut owner_rx)), vec![Status::Error, Status::Up]);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_silences_notifications() {
        let registry = LifecycleRegistry::builder(Config::default()).build();
        let (owner, mut owner_rx) = detached(&registry, "owner");
        let (a, mut a_rx) = detached(&registry, "a");

        let reg = Registration::new(owner, vec![a.clone()]);
        reg.close();
        reg.close();
        reg.notify_current_status();
        reg.update_coordinator_status(a.name(), Status::Up);

        let followed_events = drain(&mut a_rx);
        assert_eq!(followed_events.len(), 1);
        assert!(matches!(
            followed_events[0],
            Event::StopTrackingRegistration(id) if id == reg.id()
        ));

        let owner_events = drain(&mut owner_rx);
        assert_eq!(owner_events.len(), 1);
        assert!(matches!(owner_events[0], Event::CancelRegistration(id) if id == reg.id()));
    }

    #[tokio::test]
    async fn custom_events_carry_their_origin() {
        let registry = LifecycleRegistry::builder(Config::default()).build();
        let (owner, mut owner_rx) = detached(&registry, "owner");
        let (a, _a_rx) = detached(&registry, "a");

        let reg = Registration::new(owner, vec![a]);
        reg.post_custom_event(Payload::new("hello"));

        let events = drain(&mut owner_rx);
        assert!(matches!(
            &events[..],
            [Event::Custom { origin: Some(id), payload }] if *id == reg.id() && payload.is::<&str>()
        ));
    }
}
