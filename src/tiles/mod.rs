//! # Tile hierarchy.
//!
//! Tiles compose into trees: a parent tile starts and stops its **managed**
//! children, observes the health of **dependent** children, and exposes a
//! single aggregated status upward.
//!
//! - [`Tile`] / [`TileBuilder`]: construction and the public handle
//! - [`TileBehavior`]: the injected start/stop/custom hooks ([`LeafFn`], [`NoopBehavior`])
//! - [`TileState`]: the observable lifecycle state
//! - [`DependenciesVerifier`]: the single-owner check run after assembly

mod behavior;
mod builder;
mod state;
mod tile;
mod verifier;

pub use behavior::{LeafFn, NoopBehavior, StartOutcome, TileBehavior, TileContext};
pub use builder::TileBuilder;
pub use state::TileState;
pub use tile::Tile;
pub use verifier::DependenciesVerifier;
