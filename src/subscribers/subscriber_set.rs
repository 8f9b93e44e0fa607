//! # Non-blocking report fan-out to multiple subscribers.
//!
//! ## Architecture
//! ```text
//! emit(report)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_report()
//!     │    (bounded)         └──────► panic → warn!, keep going
//!     ├──► [queue 2] ──► worker 2 ──► subscriber2.on_report()
//!     └──► [queue N] ──► worker N ──► subscriberN.on_report()
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: A may process report N while B processes N+5
//! - **Overflow**: report dropped for that subscriber only, logged
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Per-subscriber FIFO**
//!
//! `AssertUnwindSafe` is used around subscriber futures; a subscriber that
//! panics while holding a lock may leave its own state inconsistent.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

use crate::events::StatusReport;
use crate::subscribers::Subscribe;

struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<StatusReport>>,
}

/// Fan-out of status reports to per-subscriber workers.
pub(crate) struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Creates the set and spawns one worker per subscriber.
    pub(crate) fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<StatusReport>>(cap);

            let handle = tokio::spawn(async move {
                while let Some(report) = rx.recv().await {
                    let fut = sub.on_report(report.as_ref());
                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = if let Some(msg) = panic_err.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = panic_err.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        };
                        warn!(subscriber = sub.name(), info = %info, "subscriber panicked");
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self { channels, workers }
    }

    /// Hands `report` to every subscriber queue without waiting.
    pub(crate) fn emit(&self, report: StatusReport) {
        let report = Arc::new(report);
        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&report)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber = channel.name,
                        seq = report.seq,
                        "subscriber queue full; report dropped"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(
                        subscriber = channel.name,
                        seq = report.seq,
                        "subscriber worker closed; report dropped"
                    );
                }
            }
        }
    }

    /// Closes every queue and waits for the workers to drain.
    pub(crate) async fn shutdown(self) {
        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Name;
    use crate::events::Status;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<u64>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_report(&self, report: &StatusReport) {
            self.0.lock().unwrap().push(report.seq);
        }
    }

    struct Explode;

    #[async_trait]
    impl Subscribe for Explode {
        async fn on_report(&self, _report: &StatusReport) {
            panic!("subscriber failure");
        }
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_affect_others() {
        let collect = Arc::new(Collect::default());
        let set = SubscriberSet::new(vec![
            Arc::new(Explode),
            Arc::clone(&collect) as Arc<dyn Subscribe>,
        ]);

        let first = StatusReport::new(Name::new("a"), Status::Up);
        let second = StatusReport::new(Name::new("a"), Status::Down);
        let expected = vec![first.seq, second.seq];
        set.emit(first);
        set.emit(second);
        set.shutdown().await;

        assert_eq!(*collect.0.lock().unwrap(), expected);
    }
}
