//! # Status report subscriber trait.
//!
//! Provides [`Subscribe`], an extension point for observing every
//! [`StatusReport`] published by a [`LifecycleRegistry`](crate::LifecycleRegistry).
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and logged)
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the report **for this subscriber only** and logs a warning.
//! - Reports are processed sequentially (FIFO) per subscriber.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use tilevisor::{Status, StatusReport, Subscribe};
//!
//! struct Pager;
//!
//! #[async_trait]
//! impl Subscribe for Pager {
//!     async fn on_report(&self, report: &StatusReport) {
//!         if report.status == Status::Error {
//!             // page whoever owns report.name
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "pager" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::StatusReport;

/// Status report subscriber.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single report on the subscriber's own worker.
    async fn on_report(&self, report: &StatusReport);

    /// Name used in logs for overflow and panics.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
