//! # Global runtime configuration.
//!
//! Provides [`Config`], the defaults a [`LifecycleRegistry`](crate::LifecycleRegistry)
//! hands to every coordinator and tile created through it.
//!
//! Config is used in two ways:
//! 1. **Registry creation**: `LifecycleRegistry::builder(config)`
//! 2. **Coordinator defaults**: `registry.create_coordinator(name, handler)` uses `batch_size`
//!
//! ## Validation
//! - `batch_size = 0` is rejected when a coordinator is constructed.
//! - `bus_capacity = 0` is clamped to 1 by the status bus.

/// Global configuration for the lifecycle runtime.
///
/// ## Field semantics
/// - `batch_size`: maximum events drained per worker iteration (must be >= 1)
/// - `bus_capacity`: status-report bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct Config {
    /// Maximum number of queued events a coordinator processes in one batch.
    ///
    /// Small batches interleave better with other coordinators; large batches
    /// amortise wake-ups. A failing event never starves the rest of its batch.
    pub batch_size: usize,

    /// Capacity of the status-report broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` reports will
    /// skip older items.
    pub bus_capacity: usize,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `batch_size = 128`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            batch_size: 128,
            bus_capacity: 1024,
        }
    }
}
