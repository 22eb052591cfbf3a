use std::{env, net::SocketAddr};

use tracing::Level;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} should be set")]
    Missing(&'static str),

    #[error("{name} can't be parsed: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Where the bot receives updates from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listener {
    Polling,
    Webhook { url: Url, addr: SocketAddr },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub database_url: String,
    pub log_level: Level,
    /// Raw entries of `ADMIN_USER_IDS`, validated when teachers are registered.
    pub admin_ids: Vec<String>,
    pub listener: Listener,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let required = |name| lookup(name).ok_or(ConfigError::Missing(name));

        let log_level = match lookup("LOG_LEVEL") {
            Some(level) => level.parse().map_err(|_| ConfigError::Invalid {
                name: "LOG_LEVEL",
                reason: format!("unknown level '{level}'"),
            })?,
            None => Level::INFO,
        };

        let admin_ids = lookup("ADMIN_USER_IDS")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let listener = match (lookup("NGROK_URL"), lookup("NGROK_ADDR")) {
            (Some(url), Some(addr)) => Listener::Webhook {
                url: url.parse().map_err(|e: url::ParseError| ConfigError::Invalid {
                    name: "NGROK_URL",
                    reason: e.to_string(),
                })?,
                addr: addr
                    .parse()
                    .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                        name: "NGROK_ADDR",
                        reason: e.to_string(),
                    })?,
            },
            _ => Listener::Polling,
        };

        Ok(Self {
            token: required("TELOXIDE_TOKEN")?,
            database_url: required("DATABASE_URL")?,
            log_level,
            admin_ids,
            listener,
        })
    }
}
