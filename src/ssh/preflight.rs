//! SSH Host Key Preflight
//!
//! Collects the host keys a server offers without ever authenticating.
//!
//! # Flow
//! 1. Resolve the dial target once
//! 2. For each host key family, open a TCP connection and start a russh
//!    handshake that only accepts that family
//! 3. Capture the key in `check_server_key`, then reject it so the
//!    connection is torn down before authentication
//! 4. Return the distinct keys in handshake order
//!
//! A single deadline bounds the whole retrieval. russh moves each handshake's
//! socket into a background session task, so every handshake hands russh a
//! `ReleasableStream`: once the handshake ends, or its future is dropped, all
//! further I/O on that socket fails and the session task closes it.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use russh::client::{self, Config};
use russh::keys::ssh_key::{Algorithm, EcdsaCurve, HashAlg};
use russh::keys::PublicKey;
use russh::Preferred;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info};

use super::error::SshError;
use super::host_key::{HostKey, KeyFormat};

/// RFC 4253: identification line is at most 255 bytes including CRLF
const MAX_BANNER_LINE_LEN: usize = 255;
/// Lines a server may send before its identification line
const MAX_PRE_BANNER_LINES: usize = 32;

/// Host key algorithms offered in one handshake. The server answers with the
/// first one it also holds a key for.
struct KeyFamily {
    name: &'static str,
    algorithms: &'static [Algorithm],
}

const HOST_KEY_FAMILIES: &[KeyFamily] = &[
    KeyFamily {
        name: "ed25519",
        algorithms: &[Algorithm::Ed25519],
    },
    KeyFamily {
        name: "ecdsa-nistp256",
        algorithms: &[Algorithm::Ecdsa {
            curve: EcdsaCurve::NistP256,
        }],
    },
    KeyFamily {
        name: "ecdsa-nistp384",
        algorithms: &[Algorithm::Ecdsa {
            curve: EcdsaCurve::NistP384,
        }],
    },
    KeyFamily {
        name: "ecdsa-nistp521",
        algorithms: &[Algorithm::Ecdsa {
            curve: EcdsaCurve::NistP521,
        }],
    },
    KeyFamily {
        name: "rsa",
        algorithms: &[
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha512),
            },
            Algorithm::Rsa {
                hash: Some(HashAlg::Sha256),
            },
            Algorithm::Rsa { hash: None },
        ],
    },
];

/// Where host keys come from. The check command only depends on this.
pub trait HostKeySource: Send + Sync {
    /// Every distinct host key `target` offers, in handshake order.
    /// Never returns an empty list on success.
    fn host_keys(
        &self,
        target: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<HostKey>, SshError>> + Send;

    /// The server's identification banner
    fn server_version(
        &self,
        target: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<ServerVersion, SshError>> + Send;
}

/// Live network source backed by russh
#[derive(Debug, Clone, Copy, Default)]
pub struct RusshKeySource;

impl HostKeySource for RusshKeySource {
    fn host_keys(
        &self,
        target: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<HostKey>, SshError>> + Send {
        retrieve_host_keys(target, timeout)
    }

    fn server_version(
        &self,
        target: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<ServerVersion, SshError>> + Send {
        retrieve_protocol_version(target, timeout)
    }
}

/// Parsed `SSH-protoversion-softwareversion [comments]` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    pub banner: String,
    pub protocol: String,
    pub software: String,
    pub comments: Option<String>,
}

impl ServerVersion {
    pub fn parse(line: &str) -> Option<Self> {
        let banner = line.trim_end_matches(['\r', '\n']);
        let rest = banner.strip_prefix("SSH-")?;
        let (protocol, rest) = rest.split_once('-')?;
        let (software, comments) = match rest.split_once(' ') {
            Some((software, comments)) => (software, Some(comments.to_string())),
            None => (rest, None),
        };

        if protocol.is_empty() || software.is_empty() {
            return None;
        }

        Some(Self {
            banner: banner.to_string(),
            protocol: protocol.to_string(),
            software: software.to_string(),
            comments,
        })
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.banner)
    }
}

/// Socket whose I/O starts failing once the paired release sender drops
struct ReleasableStream {
    inner: TcpStream,
    released: oneshot::Receiver<()>,
    closed: bool,
}

impl ReleasableStream {
    fn new(inner: TcpStream) -> (Self, oneshot::Sender<()>) {
        let (release, released) = oneshot::channel();
        let stream = Self {
            inner,
            released,
            closed: false,
        };
        (stream, release)
    }

    fn check_released(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        // A oneshot receiver must not be polled again after completing
        if !self.closed && Pin::new(&mut self.released).poll(cx).is_ready() {
            self.closed = true;
        }
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "host key handshake released",
            ));
        }
        Ok(())
    }
}

impl AsyncRead for ReleasableStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if let Err(e) = self.check_released(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for ReleasableStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Err(e) = self.check_released(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Handler that records the server key and refuses it
struct KeyCaptureHandler {
    family: &'static str,
    captured: Arc<tokio::sync::Mutex<Option<PublicKey>>>,
}

impl KeyCaptureHandler {
    fn new(family: &'static str) -> Self {
        Self {
            family,
            captured: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }
}

impl client::Handler for KeyCaptureHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Captured {} host key ({})",
            server_public_key.algorithm(),
            self.family
        );
        *self.captured.lock().await = Some(server_public_key.clone());

        // Refusing the key ends the handshake here, before any auth
        Ok(false)
    }
}

/// Retrieve every host key the server at `target` offers.
pub async fn retrieve_host_keys(target: &str, timeout: Duration) -> Result<Vec<HostKey>, SshError> {
    let deadline = Instant::now() + timeout;
    let addrs = resolve(target, deadline, timeout).await?;

    let mut keys: Vec<HostKey> = Vec::new();
    let mut last_error: Option<SshError> = None;

    for family in HOST_KEY_FAMILIES {
        match handshake(&addrs, target, family, deadline, timeout).await {
            Ok(public_key) => {
                let key = HostKey::from_public_key(&public_key)?;
                if keys.contains(&key) {
                    continue;
                }
                info!(
                    "Host key for {}: {} {}",
                    target,
                    key.algorithm(),
                    key.render(KeyFormat::Sha256Fingerprint)
                );
                keys.push(key);
            }
            Err(e) if e.is_transport() => return Err(e),
            Err(e) => {
                debug!("No {} host key from {}: {}", family.name, target, e);
                last_error = Some(e);
            }
        }
    }

    if keys.is_empty() {
        return Err(SshError::NoHostKeys {
            target: target.to_string(),
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no key presented".to_string()),
        });
    }

    Ok(keys)
}

/// Read the server's identification banner.
pub async fn retrieve_protocol_version(
    target: &str,
    timeout: Duration,
) -> Result<ServerVersion, SshError> {
    let deadline = Instant::now() + timeout;
    let addrs = resolve(target, deadline, timeout).await?;
    let stream = connect(&addrs, target, deadline, timeout).await?;

    tokio::time::timeout_at(deadline, read_banner(stream))
        .await
        .map_err(|_| timed_out(target, timeout))?
}

/// One handshake limited to `family`
async fn handshake(
    addrs: &[SocketAddr],
    target: &str,
    family: &'static KeyFamily,
    deadline: Instant,
    timeout: Duration,
) -> Result<PublicKey, SshError> {
    if Instant::now() >= deadline {
        return Err(timed_out(target, timeout));
    }
    let stream = connect(addrs, target, deadline, timeout).await?;
    // Held until the handshake returns or is dropped
    let (stream, _release) = ReleasableStream::new(stream);

    let ssh_config = Config {
        inactivity_timeout: Some(deadline.saturating_duration_since(Instant::now())),
        preferred: Preferred {
            key: Cow::Borrowed(family.algorithms),
            ..Default::default()
        },
        ..Default::default()
    };

    let handler = KeyCaptureHandler::new(family.name);
    let captured = handler.captured.clone();

    let outcome = tokio::time::timeout_at(
        deadline,
        client::connect_stream(Arc::new(ssh_config), stream, handler),
    )
    .await;

    // The handshake is expected to fail once the key has been refused
    if let Some(key) = captured.lock().await.take() {
        return Ok(key);
    }

    match outcome {
        Err(_) => Err(timed_out(target, timeout)),
        Ok(Ok(_handle)) => Err(SshError::ProtocolError(
            "handshake finished without a host key".to_string(),
        )),
        Ok(Err(e)) => Err(e),
    }
}

async fn resolve(
    target: &str,
    deadline: Instant,
    timeout: Duration,
) -> Result<Vec<SocketAddr>, SshError> {
    let addrs: Vec<SocketAddr> = tokio::time::timeout_at(deadline, tokio::net::lookup_host(target))
        .await
        .map_err(|_| timed_out(target, timeout))?
        .map_err(|e| SshError::Resolve {
            target: target.to_string(),
            reason: e.to_string(),
        })?
        .collect();

    if addrs.is_empty() {
        return Err(SshError::Resolve {
            target: target.to_string(),
            reason: "no addresses found".to_string(),
        });
    }
    Ok(addrs)
}

/// Dial each resolved address in order; the first that accepts wins.
async fn connect(
    addrs: &[SocketAddr],
    target: &str,
    deadline: Instant,
    timeout: Duration,
) -> Result<TcpStream, SshError> {
    let mut last_error = None;

    for addr in addrs {
        match tokio::time::timeout_at(deadline, TcpStream::connect(addr)).await {
            Err(_) => return Err(timed_out(target, timeout)),
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(e)) => {
                debug!("Dial {} ({}) failed: {}", target, addr, e);
                last_error = Some(format!("dial {} ({}): {}", target, addr, e));
            }
        }
    }

    Err(SshError::ConnectionFailed(
        last_error.unwrap_or_else(|| format!("dial {}: no addresses", target)),
    ))
}

fn timed_out(target: &str, timeout: Duration) -> SshError {
    SshError::Timeout(format!(
        "no answer from {} within {}s",
        target,
        timeout.as_secs_f32()
    ))
}

async fn read_banner<R>(reader: R) -> Result<ServerVersion, SshError>
where
    R: AsyncRead + Unpin,
{
    let limit = (MAX_PRE_BANNER_LINES * (MAX_BANNER_LINE_LEN + 1)) as u64;
    let mut reader = BufReader::new(reader.take(limit));
    let mut line = Vec::with_capacity(MAX_BANNER_LINE_LEN);

    for _ in 0..MAX_PRE_BANNER_LINES {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Err(SshError::ProtocolError(
                "connection closed before SSH identification".to_string(),
            ));
        }
        if line.len() > MAX_BANNER_LINE_LEN {
            return Err(SshError::ProtocolError(
                "identification line too long".to_string(),
            ));
        }

        let text = String::from_utf8_lossy(&line);
        if text.starts_with("SSH-") {
            return ServerVersion::parse(&text).ok_or_else(|| {
                SshError::ProtocolError(format!("malformed identification: {}", text.trim_end()))
            });
        }
    }

    Err(SshError::ProtocolError(format!(
        "no SSH identification within {} lines",
        MAX_PRE_BANNER_LINES
    )))
}
