use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::watch;

use crate::core::{Coordinator, LifecycleRegistry, Name};
use crate::error::CoordinatorError;
use crate::tiles::behavior::{NoopBehavior, TileBehavior};
use crate::tiles::state::TileState;
use crate::tiles::tile::{Tile, TileHandler};

/// Builder for a [`Tile`].
///
/// ## Example
/// ```rust
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// use tilevisor::{Config, LeafFn, LifecycleRegistry, StartOutcome, Tile};
///
/// let registry = LifecycleRegistry::builder(Config::default()).build();
/// let db = Tile::builder("db")
///     .behavior(LeafFn::new(|_ctx| Ok(StartOutcome::Ready)))
///     .build(&registry)?;
/// let service = Tile::builder("service").managed(db).build(&registry)?;
///
/// service.verify()?;
/// service.start()?;
/// # Ok(())
/// # }
/// ```
pub struct TileBuilder<B> {
    name: Name,
    behavior: B,
    managed: Vec<Tile>,
    dependents: Vec<Tile>,
    batch_size: Option<usize>,
}

impl TileBuilder<NoopBehavior> {
    /// Creates a builder for a tile named `name`.
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            behavior: NoopBehavior,
            managed: Vec::new(),
            dependents: Vec::new(),
            batch_size: None,
        }
    }
}

impl<B: TileBehavior> TileBuilder<B> {
    /// Replaces the tile's behavior.
    pub fn behavior<N: TileBehavior>(self, behavior: N) -> TileBuilder<N> {
        TileBuilder {
            name: self.name,
            behavior,
            managed: self.managed,
            dependents: self.dependents,
            batch_size: self.batch_size,
        }
    }

    /// Adds a child whose lifecycle this tile owns.
    pub fn managed(mut self, child: Tile) -> Self {
        self.managed.push(child);
        self
    }

    /// Adds a child whose health this tile observes without owning it.
    pub fn dependent(mut self, child: Tile) -> Self {
        self.dependents.push(child);
        self
    }

    /// Overrides the registry's default batch size.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Creates the tile's coordinator. The tile starts in [`TileState::Created`].
    pub fn build(self, registry: &Arc<LifecycleRegistry>) -> Result<Tile, CoordinatorError> {
        let (state_tx, state_rx) = watch::channel(TileState::Created);
        let closed = Arc::new(AtomicBool::new(false));
        let handler = TileHandler::new(
            self.behavior,
            self.managed.clone(),
            self.dependents.clone(),
            state_tx,
            Arc::clone(&closed),
        );
        let batch_size = self.batch_size.unwrap_or(registry.config().batch_size);
        let coordinator = Coordinator::new(self.name, batch_size, handler, registry)?;
        Ok(Tile::from_parts(
            coordinator,
            state_rx,
            self.managed,
            self.dependents,
            closed,
        ))
    }
}
