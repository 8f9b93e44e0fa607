//! Lifecycle events, status reports and the broadcast bus.
//!
//! This module groups the event **data model** consumed by coordinator
//! mailboxes and the **bus** used to publish status reports emitted by the
//! registry.
//!
//! ## Contents
//! - [`Event`], [`Status`], [`Payload`], [`TimerFactory`] mailbox events and their payloads
//! - [`StatusReport`] a published status change with ordering metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Event producers**: `Coordinator` handles, `Registration`s, timer tasks,
//!   spawned completions.
//! - **Event consumer**: exactly one `LifecycleProcessor` per coordinator.
//! - **Report publisher**: `LifecycleRegistry::update_status`.
//! - **Report consumers**: the registry listener (fans out to `SubscriberSet`).

mod bus;
mod event;
mod report;

pub use bus::Bus;
pub use event::{Event, Payload, Status, TimerFactory, TimerKey};
pub use report::StatusReport;
