//! SSH module - host key retrieval and encoding
//!
//! # Features
//! - Host specification parsing into dial targets
//! - Host key retrieval through partial russh handshakes (no authentication)
//! - Server identification banner lookup
//! - authorized_keys lines and MD5 / SHA1 / SHA256 fingerprints

mod error;
pub mod host_key;
pub mod host_spec;
pub mod preflight;
#[cfg(test)]
pub(crate) mod test_support;

pub use error::SshError;
pub use host_key::{colon_hex, HostKey, KeyFormat, KeyRecord};
pub use host_spec::{normalize, HostSpecError, DEFAULT_SSH_PORT};
pub use preflight::{
    retrieve_host_keys, retrieve_protocol_version, HostKeySource, RusshKeySource, ServerVersion,
};
