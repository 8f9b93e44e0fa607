//! # Latest-status tracker with sequence-based ordering.
//!
//! Keeps the last reported [`Status`] of every coordinator, using report
//! sequence numbers to handle out-of-order delivery.
//!
//! ## Architecture
//! ```text
//! Registry ──► Bus ──► listener ──► SubscriberSet ──► StatusTracker::update()
//!                                                            │
//!                                                            ▼
//!                                              HashMap<Name, Entry{seq, status}>
//! ```
//!
//! ## Rules
//! - Reports with `seq <= last_seq` for the same name are **rejected** (stale)
//! - A removal report forgets the name
//! - Reads are **eventually consistent** with the coordinators themselves

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::core::Name;
use crate::events::{Status, StatusReport};
use crate::subscribers::Subscribe;

#[derive(Debug, Clone, Copy)]
struct Entry {
    last_seq: u64,
    status: Status,
}

/// Thread-safe view of the latest status of every coordinator.
#[derive(Default)]
pub struct StatusTracker {
    state: RwLock<HashMap<Name, Entry>>,
    /// Highest sequence seen for removed names; keeps late reports from resurrecting them.
    removed: RwLock<HashMap<Name, u64>>,
}

impl StatusTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `report` if it is newer than the last one seen for its name.
    ///
    /// Returns `true` if the tracked state changed.
    pub fn update(&self, report: &StatusReport) -> bool {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed = self.removed.write().unwrap_or_else(PoisonError::into_inner);

        let last_seq = state
            .get(&report.name)
            .map(|e| e.last_seq)
            .or_else(|| removed.get(&report.name).copied())
            .unwrap_or(0);
        if report.seq <= last_seq {
            return false;
        }

        if report.removed {
            removed.insert(report.name.clone(), report.seq);
            return state.remove(&report.name).is_some();
        }
        removed.remove(&report.name);
        let previous = state.insert(
            report.name.clone(),
            Entry {
                last_seq: report.seq,
                status: report.status,
            },
        );
        previous.map(|e| e.status) != Some(report.status)
    }

    /// Last known status of `name`, if it is tracked.
    pub fn status(&self, name: &str) -> Option<Status> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|e| e.status)
    }

    /// Sorted names currently reported [`Status::Up`].
    pub fn healthy(&self) -> Vec<Name> {
        self.filtered(Status::Up)
    }

    /// Sorted names currently reported [`Status::Error`].
    pub fn failed(&self) -> Vec<Name> {
        self.filtered(Status::Error)
    }

    fn filtered(&self, wanted: Status) -> Vec<Name> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<Name> = state
            .iter()
            .filter(|(_, e)| e.status == wanted)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }
}

#[async_trait]
impl Subscribe for StatusTracker {
    async fn on_report(&self, report: &StatusReport) {
        self.update(report);
    }

    fn name(&self) -> &'static str {
        "status_tracker"
    }

    fn queue_capacity(&self) -> usize {
        2048
    }
}
