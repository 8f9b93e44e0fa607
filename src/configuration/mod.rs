//! # Configuration-aware tiles.
//!
//! - [`ConfigurationSource`] / [`InMemoryConfigSource`]: where snapshots come from
//! - [`ConfigSubscription`]: the registration handle, closed on stop/close
//! - [`ConfigurationAwareBehavior`]: a [`TileBehavior`](crate::TileBehavior) applying one key
//! - [`json_parser`]: `serde_json` parsing of raw values

mod parser;
mod source;
mod tile;

pub use parser::{ConfigParser, json_parser};
pub use source::{
    ConfigKey, ConfigSubscription, ConfigurationHandler, ConfigurationSource,
    InMemoryConfigSource, RawConfig,
};
pub use tile::{ConfigurationAwareBehavior, ConfigurationChangeHandler};
