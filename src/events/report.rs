//! # Status reports published by the registry.
//!
//! Every time a coordinator's status changes (or it is started/removed), the
//! [`LifecycleRegistry`](crate::LifecycleRegistry) publishes a [`StatusReport`]
//! on the [`Bus`](super::Bus).
//!
//! ## Ordering guarantees
//! Each report has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when reports are delivered out of order.
//!
//! ## Example
//! ```rust
//! use tilevisor::{Name, Status, StatusReport};
//!
//! let report = StatusReport::new(Name::new("gateway"), Status::Error)
//!     .with_reason("listener failed");
//!
//! assert_eq!(report.status, Status::Error);
//! assert_eq!(report.reason.as_deref(), Some("listener failed"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::core::Name;
use crate::events::Status;

/// Global sequence counter for report ordering.
static REPORT_SEQ: AtomicU64 = AtomicU64::new(1);

/// A published status of one coordinator.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
#[derive(Clone, Debug)]
pub struct StatusReport {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Coordinator the report is about.
    pub name: Name,
    /// Reported status.
    pub status: Status,
    /// Human-readable reason for the change.
    pub reason: Option<Arc<str>>,
    /// The coordinator was removed from the registry (closed).
    pub removed: bool,
}

impl StatusReport {
    /// Creates a new report with current timestamp and next sequence number.
    pub fn new(name: Name, status: Status) -> Self {
        Self {
            seq: REPORT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            name,
            status,
            reason: None,
            removed: false,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Marks the report as the coordinator's removal.
    #[inline]
    pub fn removed(mut self) -> Self {
        self.removed = true;
        self
    }
}
