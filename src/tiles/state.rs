use std::fmt;

/// Observable lifecycle state of a tile.
///
/// ```text
/// Created ──start──► Started ──stop──► StoppedByParent ──start──► Started
///                       │
///                       └──error──► StoppedDueToError ──start──► Started
/// ```
///
/// Closing a tile does not change this value; see [`Tile::is_closed`](crate::Tile::is_closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileState {
    /// Built, never started.
    #[default]
    Created,
    /// Started; may still be waiting for children or configuration.
    Started,
    /// Stopped on request (by its parent or the caller).
    StoppedByParent,
    /// Stopped (or quarantined) because of an error.
    StoppedDueToError,
}

impl TileState {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            TileState::Created => "created",
            TileState::Started => "started",
            TileState::StoppedByParent => "stopped_by_parent",
            TileState::StoppedDueToError => "stopped_due_to_error",
        }
    }
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
