//! Loopback SSH servers for tests

use std::net::SocketAddr;
use std::sync::Arc;

use russh::keys::PrivateKey;
use russh::server;
use tokio::net::TcpListener;

pub const HOST_ED25519: &str = include_str!("testdata/host_ed25519");
pub const HOST_ED25519_PUB: &str = include_str!("testdata/host_ed25519.pub");
pub const HOST_ECDSA_P256: &str = include_str!("testdata/host_ecdsa_p256");
pub const HOST_ECDSA_P256_PUB: &str = include_str!("testdata/host_ecdsa_p256.pub");
pub const HOST_RSA: &str = include_str!("testdata/host_rsa");
pub const HOST_RSA_PUB: &str = include_str!("testdata/host_rsa.pub");

/// Fingerprints of the fixtures as printed by `ssh-keygen -l -E md5` and
/// SHA1 over the same blob: (md5, sha1)
pub const HOST_ED25519_DIGESTS: (&str, &str) = (
    "ac:c3:94:d6:8c:4a:65:9a:2b:8c:4f:b9:bf:ec:9e:85",
    "04:be:fa:3e:6c:ba:b9:c2:08:eb:be:73:12:aa:9b:38:da:d9:0d:3a",
);
pub const HOST_ECDSA_P256_DIGESTS: (&str, &str) = (
    "0d:9e:10:9c:2a:1f:8b:97:99:c9:33:6e:75:73:f3:36",
    "65:3d:52:dc:59:49:77:3d:ab:c8:d2:98:43:24:db:f1:d6:78:bb:1b",
);
pub const HOST_RSA_DIGESTS: (&str, &str) = (
    "3f:ab:65:70:ba:3c:55:fa:34:3a:f3:a6:4e:d5:10:3a",
    "ca:53:fe:00:64:2f:4e:be:77:7e:26:eb:cf:d1:62:2b:01:a5:0d:dc",
);

/// `<algorithm> <base64>` from a `.pub` fixture, without comment
pub fn authorized_line(public: &str) -> String {
    public
        .split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Server side that refuses every authentication attempt
struct RefuseAll;

impl server::Handler for RefuseAll {
    type Error = russh::Error;
}

/// Start a russh server holding `host_keys` (OpenSSH private key text).
pub async fn spawn_ssh_server(host_keys: &[&str]) -> SocketAddr {
    let keys = host_keys
        .iter()
        .map(|text| PrivateKey::from_openssh(*text).unwrap())
        .collect();
    let config = Arc::new(server::Config {
        keys,
        ..Default::default()
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let config = config.clone();
            tokio::spawn(async move {
                if let Ok(session) = server::run_stream(config, socket, RefuseAll).await {
                    let _ = session.await;
                }
            });
        }
    });
    addr
}
