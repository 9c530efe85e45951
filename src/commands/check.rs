//! Host key check command
//!
//! Validates the requested host, asks the key source for the server banner
//! and host keys under one deadline, and renders each key. Nothing is retried
//! and nothing is cached; every request stands alone.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ssh::{normalize, HostKeySource, KeyRecord, SshError};

/// Budget for everything that touches the remote host
pub const CHECK_TIMEOUT_SECS: u64 = 30;

/// Body of `POST /check`
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    #[serde(rename = "Host", alias = "host")]
    pub host: Option<String>,
}

/// Successful check
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    #[serde(rename = "Host")]
    pub host: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "PublicKeys")]
    pub public_keys: Vec<KeyRecord>,
}

/// Failed check
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "Host", skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(rename = "Error")]
    pub error: String,
}

#[derive(Error, Debug)]
pub enum CheckError {
    /// Body missing, not JSON, or without a usable `Host`
    #[error("Invalid request")]
    InvalidRequest,

    #[error("Invalid hostname")]
    InvalidHost,

    /// Anything that went wrong talking to the remote host
    #[error("{source}")]
    Retrieval {
        host: String,
        #[source]
        source: SshError,
    },
}

impl CheckError {
    /// HTTP status class for this failure
    pub fn status(&self) -> u16 {
        match self {
            CheckError::InvalidRequest | CheckError::InvalidHost => 400,
            CheckError::Retrieval { .. } => 500,
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let host = match self {
            CheckError::Retrieval { host, .. } => Some(host.clone()),
            _ => None,
        };
        ErrorResponse {
            host,
            error: self.to_string(),
        }
    }
}

/// Runs checks against a host key source
pub struct HostKeyChecker<S> {
    source: S,
    timeout: Duration,
}

impl<S: HostKeySource> HostKeyChecker<S> {
    pub fn new(source: S, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Check using a raw JSON request body
    pub async fn check_body(&self, body: &[u8]) -> Result<CheckResponse, CheckError> {
        let request: CheckRequest =
            serde_json::from_slice(body).map_err(|_| CheckError::InvalidRequest)?;
        let host = request.host.ok_or(CheckError::InvalidRequest)?;
        self.check(&host).await
    }

    /// Check a host given as user text
    pub async fn check(&self, raw_host: &str) -> Result<CheckResponse, CheckError> {
        let host = raw_host.trim();
        if host.is_empty() {
            return Err(CheckError::InvalidRequest);
        }

        let target = normalize(host).map_err(|e| {
            debug!("Rejected host {:?}: {}", host, e);
            CheckError::InvalidHost
        })?;

        let retrieval_failed = |source: SshError| {
            warn!("'{}' Failed: {}", target, source);
            CheckError::Retrieval {
                host: host.to_string(),
                source,
            }
        };

        let deadline = Instant::now() + self.timeout;

        info!("Getting Version for '{}'", target);
        let version = self
            .bounded(deadline, self.source.server_version(&target, self.remaining(deadline)))
            .await
            .map_err(retrieval_failed)?;
        info!("Got '{}' Version for '{}'", version, target);

        info!("Getting Keys for '{}'", target);
        let keys = self
            .bounded(deadline, self.source.host_keys(&target, self.remaining(deadline)))
            .await
            .map_err(retrieval_failed)?;

        if keys.is_empty() {
            return Err(retrieval_failed(SshError::NoHostKeys {
                target: target.clone(),
                reason: "server presented no key".to_string(),
            }));
        }
        info!("Got {} Keys for '{}'", keys.len(), target);

        Ok(CheckResponse {
            host: host.to_string(),
            version: version.to_string(),
            public_keys: keys.iter().map(KeyRecord::from_key).collect(),
        })
    }

    fn remaining(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(Instant::now())
    }

    /// Enforce the deadline even if the source overruns it
    async fn bounded<T>(
        &self,
        deadline: Instant,
        fut: impl std::future::Future<Output = Result<T, SshError>>,
    ) -> Result<T, SshError> {
        tokio::time::timeout_at(deadline, fut).await.unwrap_or_else(|_| {
            Err(SshError::Timeout(format!(
                "check exceeded {}s",
                self.timeout.as_secs_f32()
            )))
        })
    }
}
