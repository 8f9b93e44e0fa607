//! # Bus for broadcasting status reports.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from any coordinator worker.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                       Subscriber (one):
//!   coordinator worker 1 ──┐
//!   coordinator worker 2 ──┼──► Bus ───► registry listener ───► SubscriberSet
//!   coordinator worker N ──┘  (broadcast)   (in RegistryBuilder)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent reports for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: reports are lost if there are no active receivers at send time.

use tokio::sync::broadcast;

use super::report::StatusReport;

/// Broadcast channel for status reports.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<StatusReport>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<StatusReport>(capacity);
        Self { tx }
    }

    /// Publishes a report to all active receivers.
    ///
    /// If there are no receivers, the report is dropped.
    pub fn publish(&self, report: StatusReport) {
        let _ = self.tx.send(report);
    }

    /// Creates a new receiver that will observe subsequent reports.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusReport> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Name;
    use crate::events::Status;

    #[tokio::test]
    async fn receivers_observe_reports_sent_after_subscribing() {
        let bus = Bus::new(0);
        bus.publish(StatusReport::new(Name::new("early"), Status::Up));

        let mut rx = bus.subscribe();
        bus.publish(StatusReport::new(Name::new("late"), Status::Down));

        let got = rx.recv().await.expect("report");
        assert_eq!(got.name.as_str(), "late");
        assert_eq!(got.status, Status::Down);
    }
}
