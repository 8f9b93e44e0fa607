//! # Structured logging subscriber.
//!
//! [`LogWriter`] turns every [`StatusReport`] into a `tracing` event:
//! `Error` at warn level, everything else at info.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  tilevisor: status changed coordinator=gateway status=UP seq=12 reason="started"
//! WARN  tilevisor: status changed coordinator=db status=ERROR seq=13 reason="stopped with error"
//! INFO  tilevisor: coordinator removed coordinator=db seq=14
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{Status, StatusReport};
use crate::subscribers::Subscribe;

/// Logs status reports through `tracing`.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Constructs a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_report(&self, r: &StatusReport) {
        let reason = r.reason.as_deref().unwrap_or("");
        if r.removed {
            info!(coordinator = %r.name, seq = r.seq, "coordinator removed");
            return;
        }
        match r.status {
            Status::Error => {
                warn!(
                    coordinator = %r.name,
                    status = %r.status,
                    seq = r.seq,
                    reason,
                    "status changed"
                );
            }
            Status::Up | Status::Down => {
                info!(
                    coordinator = %r.name,
                    status = %r.status,
                    seq = r.seq,
                    reason,
                    "status changed"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
