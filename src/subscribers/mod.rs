//! # Status report subscribers.
//!
//! Every status change a coordinator publishes becomes a
//! [`StatusReport`](crate::StatusReport) on the registry's bus. The registry
//! listener fans reports out to subscribers, each on its own worker.
//!
//! ## Architecture
//! ```text
//! Coordinator worker ── update_status ──► Bus ──► listener ──► SubscriberSet
//!                                                                  │
//!                                                    ┌─────────────┼──────────┐
//!                                                    ▼             ▼          ▼
//!                                             StatusTracker    LogWriter   Custom...
//! ```
//!
//! - **Stateful**: [`StatusTracker`] (always installed by the registry)
//! - **Passive**: [`LogWriter`] and anything implementing [`Subscribe`]

mod log;
mod subscriber;
mod subscriber_set;
mod tracker;

pub use log::LogWriter;
pub use subscriber::Subscribe;
pub(crate) use subscriber_set::SubscriberSet;
pub use tracker::StatusTracker;
