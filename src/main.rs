use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;

use ssh_keycheck::commands::HostKeyChecker;
use ssh_keycheck::config::ServiceConfig;
use ssh_keycheck::server::{self, AppState};
use ssh_keycheck::ssh::RusshKeySource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ssh_keycheck::init_logging();

    let config = ServiceConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        "Starting ssh-keycheck {} (static dir {:?}, timeout {:?})",
        env!("CARGO_PKG_VERSION"),
        config.static_dir,
        config.timeout
    );

    let addr = config.listen_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let state = Arc::new(AppState {
        checker: HostKeyChecker::new(RusshKeySource, config.timeout),
        static_dir: config.static_dir,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            // Keep serving; dropping the sender would stop the accept loop
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl-C");
        let _ = shutdown_tx.send(true);
    });

    server::serve(listener, state, shutdown_rx).await;
    Ok(())
}
