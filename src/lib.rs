//! ssh-keycheck - reports the SSH host keys a server offers
//!
//! `POST /check {"Host": "example.com"}` answers with the server's
//! identification banner and, for every host key, the authorized-keys line
//! plus MD5 and SHA1 fingerprints.

// Use mimalloc as the global allocator; every request allocates many small
// buffers (packets, JSON, fingerprints)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod commands;
pub mod config;
pub mod server;
pub mod ssh;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging (`RUST_LOG` overrides the default `info` level)
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
