//! # tilevisor
//!
//! **Tilevisor** is a dependency-aware component supervision library for Rust.
//!
//! Each unit of functionality (a listener, a cache, a database-backed
//! service) is wrapped in a supervised **tile** with a uniform
//! start/stop/health contract. Tiles compose into trees: a parent starts and
//! stops the children it manages, observes the health of the children it
//! depends on, and exposes one aggregated status upward.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!                 ┌───────────────────────────────┐
//!                 │ Tile "service" (composite)    │
//!                 │  Coordinator ─► TileHandler   │
//!                 └───────┬───────────────▲───────┘
//!      start/stop (calls) │               │ RegistrationStatusChange (events)
//!            ┌────────────┴──┐        ┌───┴───────────┐
//!            ▼               ▼        │               │
//!     ┌────────────┐  ┌────────────┐  │  Registration │ (one per child)
//!     │ Tile "db"  │  │Tile "cache"│──┘  aggregate:   │
//!     │  (leaf)    │  │  (config)  │     ERROR > all UP > DOWN
//!     └─────┬──────┘  └─────┬──────┘
//!           ▼               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  LifecycleRegistry (explicit context object)                      │
//! │  - name → Coordinator (weak)                                      │
//! │  - Bus (broadcast StatusReport)                                   │
//! │  - StatusTracker (latest status, sequence-based)                  │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Coordinator
//! ```text
//! post_event ─► mpsc mailbox ─► worker task (one per coordinator)
//!
//! loop {
//!   ├─► recv_many(batch_size)
//!   └─► for each event:
//!         ├─ bookkeeping (timers, registrations, Close) ─► always processed
//!         ├─ Start                                      ─► only while stopped
//!         ├─ anything else while stopped                ─► dropped
//!         └─ handler.on_event(event, ctx)
//!               └─ Err ─► Error{handled:false} delivered next, same batch
//!                           └─ still unhandled ─► Stop{errored:true}
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                               |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------------|
//! | **Coordinators**  | Single-threaded event processing, timers, resources.          | [`Coordinator`], [`EventHandler`], [`Context`]   |
//! | **Health**        | Aggregated status of followed coordinators.                   | [`Registration`], [`Status`]                     |
//! | **Tiles**         | Leaf/composite tiles, fail-together, restart on recovery.     | [`Tile`], [`TileBuilder`], [`TileBehavior`]      |
//! | **Configuration** | Typed, asynchronously applied configuration.                  | [`ConfigurationAwareBehavior`], [`InMemoryConfigSource`] |
//! | **Verification**  | Single-owner check for tile trees.                            | [`DependenciesVerifier`]                         |
//! | **Observability** | Status reports, `tracing` output, custom subscribers.         | [`Subscribe`], [`LogWriter`], [`StatusTracker`]  |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use tilevisor::{Config, LeafFn, LifecycleRegistry, LogWriter, StartOutcome, Status, Subscribe, Tile};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
//!     let registry = LifecycleRegistry::builder(Config::default())
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let db = Tile::builder("db")
//!         .behavior(LeafFn::new(|_ctx| Ok(StartOutcome::Ready)))
//!         .build(&registry)?;
//!     let service = Tile::builder("service").managed(db).build(&registry)?;
//!     service.verify()?;
//!
//!     let mut status = service.coordinator().subscribe_status();
//!     service.start()?;
//!     status.wait_for(|s| *s == Status::Up).await?;
//!
//!     service.close();
//!     service.terminated().await;
//!     Ok(())
//! }
//! ```
mod config;
mod configuration;
mod core;
mod error;
mod events;
mod subscribers;
mod tiles;

// ---- Public re-exports ----

pub use config::Config;
pub use configuration::{
    ConfigKey, ConfigParser, ConfigSubscription, ConfigurationAwareBehavior,
    ConfigurationChangeHandler, ConfigurationHandler, ConfigurationSource, InMemoryConfigSource,
    RawConfig, json_parser,
};
pub use core::{
    Context, Coordinator, EventHandler, HandlerFn, LifecycleRegistry, Name, Registration,
    RegistrationId, RegistryBuilder, ResourceFn, ResourceTable, ScopedResource,
};
pub use error::{
    BatchError, BoxError, ConfigError, CoordinatorError, HandlerError, ResourceError, VerifyError,
};
pub use events::{Bus, Event, Payload, Status, StatusReport, TimerFactory, TimerKey};
pub use subscribers::{LogWriter, StatusTracker, Subscribe};
pub use tiles::{
    DependenciesVerifier, LeafFn, NoopBehavior, StartOutcome, Tile, TileBehavior, TileBuilder,
    TileContext, TileState,
};
