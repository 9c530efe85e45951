//! Service configuration
//!
//! Read once from the environment at startup:
//!
//! | Variable                | Default  |
//! |-------------------------|----------|
//! | `PORT`                  | required (falls back to `HTTP_PLATFORM_PORT`) |
//! | `KEYCHECK_BIND`         | `0.0.0.0` |
//! | `KEYCHECK_STATIC_DIR`   | `static` |
//! | `KEYCHECK_TIMEOUT_SECS` | `30`     |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::commands::CHECK_TIMEOUT_SECS;

pub const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("$PORT must be set")]
    MissingPort,

    #[error("Invalid port {0:?}")]
    InvalidPort(String),

    #[error("Invalid bind address {0:?}")]
    InvalidBind(String),

    #[error("Invalid timeout {0:?}: expected a positive number of seconds")]
    InvalidTimeout(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub static_dir: PathBuf,
    pub timeout: Duration,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = var("PORT")
            .or_else(|| var("HTTP_PLATFORM_PORT"))
            .ok_or(ConfigError::MissingPort)?;
        let port = match port.trim().parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ => return Err(ConfigError::InvalidPort(port)),
        };

        let bind = match var("KEYCHECK_BIND") {
            Some(raw) => raw
                .trim()
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidBind(raw))?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let static_dir = var("KEYCHECK_STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR));

        let timeout = match var("KEYCHECK_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidTimeout(raw)),
            },
            None => Duration::from_secs(CHECK_TIMEOUT_SECS),
        };

        Ok(Self {
            bind,
            port,
            static_dir,
            timeout,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}
