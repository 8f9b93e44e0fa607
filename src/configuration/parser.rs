use serde::de::DeserializeOwned;

use crate::configuration::RawConfig;
use crate::error::BoxError;

/// Parses a raw configuration value into a typed one.
pub type ConfigParser<C> = Box<dyn Fn(&RawConfig) -> Result<C, BoxError> + Send>;

/// Parser deserialising the raw value with `serde_json`.
///
/// ## Example
/// ```rust
/// use serde::Deserialize;
/// use serde_json::json;
/// use tilevisor::json_parser;
///
/// #[derive(Deserialize, PartialEq, Debug)]
/// struct Listener { port: u16 }
///
/// let parse = json_parser::<Listener>();
/// assert_eq!(parse(&json!({"port": 8443})).unwrap(), Listener { port: 8443 });
/// assert!(parse(&json!({"port": "https"})).is_err());
/// ```
pub fn json_parser<T>() -> impl Fn(&RawConfig) -> Result<T, BoxError> + Send + Sync + 'static
where
    T: DeserializeOwned + 'static,
{
    |raw: &RawConfig| T::deserialize(raw).map_err(BoxError::from)
}
