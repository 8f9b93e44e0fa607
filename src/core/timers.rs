//! # Per-coordinator timers on the shared tokio timer facility.
//!
//! A timer is a spawned `sleep` that posts [`Event::Timer`] back into the
//! owning coordinator's mailbox; it never touches coordinator state.
//!
//! ## Rules
//! - One live timer per key; scheduling under an existing key cancels the old one.
//! - Every schedule gets a fresh generation. A fire whose generation is no longer
//!   live (cancelled or replaced after the sleep completed) is dropped by the processor.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::core::Coordinator;
use crate::events::{Event, TimerFactory, TimerKey};

struct TimerEntry {
    generation: u64,
    handle: AbortHandle,
}

/// Active timers of one coordinator. Owned by its worker.
#[derive(Default)]
pub(crate) struct Timers {
    entries: HashMap<TimerKey, TimerEntry>,
    next_generation: u64,
}

impl Timers {
    /// Schedules `factory` to be posted to `target` after `delay`, replacing any timer under `key`.
    pub(crate) fn schedule(
        &mut self,
        key: TimerKey,
        delay: Duration,
        factory: TimerFactory,
        target: Coordinator,
    ) {
        self.cancel(&key);
        self.next_generation += 1;
        let generation = self.next_generation;

        let fired_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            target.post_event(Event::Timer {
                key: fired_key,
                generation,
                event: Box::new(factory.produce()),
            });
        })
        .abort_handle();

        self.entries.insert(key, TimerEntry { generation, handle });
    }

    /// Consumes a fire notification. Returns `false` for stale fires.
    pub(crate) fn take_fired(&mut self, key: &str, generation: u64) -> bool {
        match self.entries.get(key) {
            Some(entry) if entry.generation == generation => {
                self.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Cancels and forgets the timer under `key`.
    pub(crate) fn cancel(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every outstanding timer.
    pub(crate) fn cancel_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.handle.abort();
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
