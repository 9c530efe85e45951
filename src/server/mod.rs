//! HTTP front end
//!
//! Accepts connections on a tokio `TcpListener`, one task per connection and
//! one request per connection. Routes:
//!
//! - `POST /check`  host key check
//! - `POST /hash`   SHA1 of the running binary
//! - `OPTIONS *`    CORS preflight
//! - `GET`/`HEAD`   static files

pub mod http;
pub mod static_files;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use uuid::Uuid;

use crate::commands::{executable_hash, HostKeyChecker};
use crate::ssh::HostKeySource;

use self::http::{read_request, HttpError, Request, Response};

/// Time allowed for the client to send its request
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Shared, immutable per-process state
pub struct AppState<S> {
    pub checker: HostKeyChecker<S>,
    pub static_dir: PathBuf,
}

/// Dispatch one parsed request.
pub async fn route<S: HostKeySource>(state: &AppState<S>, request: &Request) -> Response {
    match (request.method.as_str(), request.path()) {
        ("OPTIONS", _) => Response::new(204, "text/plain; charset=utf-8", Vec::new()),
        ("POST", "/check") => match state.checker.check_body(&request.body).await {
            Ok(result) => Response::json(200, &result),
            Err(e) => Response::json(e.status(), &e.to_response()),
        },
        ("POST", "/hash") => match executable_hash().await {
            Ok(hash) => Response::json(200, &hash),
            Err(e) => {
                tracing::error!("Failed to hash executable: {}", e);
                Response::json_error(500, &e.to_string())
            }
        },
        ("GET" | "HEAD", path) => static_files::serve(&state.static_dir, path).await,
        ("POST", _) => Response::json_error(404, "Not Found"),
        _ => Response::json_error(405, "Method not allowed"),
    }
}

/// Resolves once the peer closes (or breaks) its sending half.
async fn wait_for_disconnect<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 512];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

/// Handle a single TCP connection: read the request, dispatch, respond.
async fn handle_connection<S: HostKeySource>(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<AppState<S>>,
) {
    let id = Uuid::new_v4();
    let started = Instant::now();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let request = match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request(&mut reader)).await
    {
        Ok(Ok(request)) => request,
        Ok(Err(e)) => {
            if let Some(status) = e.status() {
                tracing::debug!("Request {} from {} rejected: {}", id, peer, e);
                let _ = writer
                    .write_all(&Response::json_error(status, &e.to_string()).encode(false))
                    .await;
                let _ = writer.shutdown().await;
            } else if !matches!(e, HttpError::Closed) {
                tracing::debug!("Request {} from {} dropped: {}", id, peer, e);
            }
            return;
        }
        Err(_) => {
            tracing::debug!("Request {} from {} timed out", id, peer);
            let _ = writer
                .write_all(&Response::json_error(408, "Request timeout").encode(false))
                .await;
            let _ = writer.shutdown().await;
            return;
        }
    };

    let response = tokio::select! {
        response = route(&state, &request) => response,
        _ = wait_for_disconnect(&mut reader) => {
            tracing::info!(
                "Request {} {} {} cancelled by client after {:?}",
                id,
                request.method,
                request.path(),
                started.elapsed()
            );
            return;
        }
    };

    let head_only = request.method == "HEAD";
    if let Err(e) = writer.write_all(&response.encode(head_only)).await {
        tracing::debug!("Request {}: failed to write response: {}", id, e);
    }
    let _ = writer.shutdown().await;

    tracing::info!(
        "Request {} {} {} {} {} {:?}",
        id,
        peer,
        request.method,
        request.path(),
        response.status,
        started.elapsed()
    );
}

/// Accept loop. Runs until `shutdown` flips to `true` or its sender drops.
pub async fn serve<S>(
    listener: TcpListener,
    state: Arc<AppState<S>>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: HostKeySource + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on {}", addr);
    }

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        tokio::spawn(handle_connection(stream, peer, state.clone()));
                    }
                    Err(e) => tracing::warn!("Accept error: {}", e),
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("Shutting down");
                    break;
                }
            }
        }
    }
}
