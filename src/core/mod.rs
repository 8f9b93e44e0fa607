//! Runtime core: lifecycle coordinators and their registry.
//!
//! Internal modules:
//! - [`coordinator`]: the public handle and its mailbox;
//! - [`processor`]: the per-coordinator event loop (batching, error escalation);
//! - [`context`]: what a handler may do while processing one event;
//! - [`registration`]: aggregated health of followed coordinators;
//! - [`timers`]: keyed one-shot timers posting back into the mailbox;
//! - [`resources`]: resources scoped to one run of a coordinator;
//! - [`registry`] / [`builder`]: name lookup and status reporting.

mod builder;
mod context;
mod coordinator;
mod handler;
mod name;
mod processor;
mod registration;
mod registry;
mod resources;
mod state;
mod timers;

pub use builder::RegistryBuilder;
pub use context::Context;
pub use coordinator::Coordinator;
pub use handler::{EventHandler, HandlerFn};
pub use name::Name;
pub use registration::{Registration, RegistrationId};
pub use registry::LifecycleRegistry;
pub use resources::{ResourceFn, ResourceTable, ScopedResource};

#[cfg(test)]
pub(crate) use coordinator::tests as test_support;
