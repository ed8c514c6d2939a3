use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::catalog::DeliveryOrder;
use crate::logging::log_event;

pub const DEFAULT_HOST: &str = "wrds-pgdata.wharton.upenn.edu";
pub const DEFAULT_PORT: u16 = 9737;
pub const DEFAULT_DATABASE: &str = "wrds";
pub const DEFAULT_LIBRARY: &str = "tr_ds_fut";
pub const DEFAULT_OUTPUT_DIR: &str = "_data";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting `{0}` is not set")]
    Missing(&'static str),
    #[error("setting `{key}` has invalid value `{value}`")]
    Invalid { key: &'static str, value: String },
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenv::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Connection and output settings for one run.
///
/// Built once at startup and passed to whatever needs it; nothing in the crate
/// reads the process environment after this point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrdsConfig {
    /// WRDS account name (`WRDS_USERNAME`). Required.
    pub username: String,
    /// Optional password (`WRDS_PASSWORD`). When absent the driver falls back
    /// to `~/.pgpass`.
    pub password: Option<String>,
    /// `WRDS_HOST`, defaults to the WRDS PostgreSQL gateway.
    pub host: String,
    /// `WRDS_PORT`, defaults to 9737.
    pub port: u16,
    /// `WRDS_DATABASE`, defaults to `wrds`.
    pub database: String,
    /// Datastream futures library (`WRDS_LIBRARY`), defaults to `tr_ds_fut`.
    pub library: String,
    /// Where Parquet/CSV outputs land (`DATA_DIR`), defaults to `_data`.
    pub output_dir: PathBuf,
    /// How delivery months are ordered in results (`DELIVERY_ORDER`).
    pub delivery_order: DeliveryOrder,
}

impl WrdsConfig {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            library: DEFAULT_LIBRARY.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            delivery_order: DeliveryOrder::default(),
        }
    }

    /// Load `.env` from the working directory (if present), then read the
    /// process environment.
    pub fn from_env() -> ConfigResult<Self> {
        if let Ok(path) = dotenv::dotenv() {
            log_event(
                file!(),
                "WrdsConfig",
                "from_env",
                "config.load",
                line!(),
                &format!("Loaded environment from {}", path.display()),
                None,
                None,
            );
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load a specific env file, then read the process environment.
    pub fn from_env_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        dotenv::from_path(path).map_err(|source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let username = get("WRDS_USERNAME").ok_or(ConfigError::Missing("WRDS_USERNAME"))?;
        let mut config = Self::new(username.trim());
        config.password = get("WRDS_PASSWORD");

        if let Some(host) = get("WRDS_HOST") {
            config.host = host;
        }
        if let Some(port) = get("WRDS_PORT") {
            config.port = port.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "WRDS_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(database) = get("WRDS_DATABASE") {
            config.database = database;
        }
        if let Some(library) = get("WRDS_LIBRARY") {
            config.library = library;
        }
        if let Some(dir) = get("DATA_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(order) = get("DELIVERY_ORDER") {
            config.delivery_order =
                DeliveryOrder::from_str(&order).map_err(|_| ConfigError::Invalid {
                    key: "DELIVERY_ORDER",
                    value: order.clone(),
                })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_fill_everything_but_username() {
        let config = WrdsConfig::from_lookup(lookup(&[("WRDS_USERNAME", "jdoe")])).unwrap();
        assert_eq!(config.username, "jdoe");
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, 9737);
        assert_eq!(config.library, "tr_ds_fut");
        assert_eq!(config.delivery_order, DeliveryOrder::Chronological);
        assert!(config.password.is_none());
    }

    #[test]
    fn missing_or_blank_username_is_fatal() {
        assert!(matches!(
            WrdsConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("WRDS_USERNAME"))
        ));
        assert!(matches!(
            WrdsConfig::from_lookup(lookup(&[("WRDS_USERNAME", "  ")])),
            Err(ConfigError::Missing("WRDS_USERNAME"))
        ));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = WrdsConfig::from_lookup(lookup(&[
            ("WRDS_USERNAME", "jdoe"),
            ("WRDS_PORT", "5432"),
            ("DELIVERY_ORDER", "literal"),
            ("DATA_DIR", "/tmp/out"),
        ]))
        .unwrap();
        assert_eq!(config.port, 5432);
        assert_eq!(config.delivery_order, DeliveryOrder::Literal);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = WrdsConfig::from_lookup(lookup(&[
            ("WRDS_USERNAME", "jdoe"),
            ("WRDS_PORT", "ninety"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "WRDS_PORT", .. }));
    }
}
