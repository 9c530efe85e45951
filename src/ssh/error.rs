//! SSH Error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Failed to resolve {target}: {reason}")]
    Resolve { target: String, reason: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("No host keys offered by {target}: {reason}")]
    NoHostKeys { target: String, reason: String },
}

impl SshError {
    /// Whether the failure happened before the SSH layer was reached
    /// (DNS, TCP connect, deadline). Such failures end a retrieval; a
    /// protocol failure only ends the current handshake.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SshError::Resolve { .. } | SshError::ConnectionFailed(_) | SshError::Timeout(_)
        )
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(err: russh::keys::Error) -> Self {
        SshError::KeyError(err.to_string())
    }
}

// Retrieval errors reach the client as plain strings
impl serde::Serialize for SshError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
