//! Host key encoding
//!
//! A `HostKey` is the SSH wire-format blob the server presented, as used in
//! authorized_keys and known_hosts. Every rendering is computed from that
//! blob alone, so identical bytes always produce identical output.

use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use md5::Md5;
use russh::keys::{PublicKey, PublicKeyBase64};
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use super::error::SshError;

/// Upper bound on the algorithm name at the head of a key blob
const MAX_ALGORITHM_NAME_LEN: usize = 64;

/// Output formats a host key can be rendered in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// `<algorithm> <base64 blob>`
    AuthorizedKeys,
    /// Colon separated lowercase hex of MD5(blob)
    Md5Fingerprint,
    /// Colon separated lowercase hex of SHA1(blob)
    Sha1Fingerprint,
    /// OpenSSH style `SHA256:<unpadded base64>`
    Sha256Fingerprint,
}

/// One host key as offered by a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostKey {
    algorithm: String,
    blob: Vec<u8>,
}

impl HostKey {
    /// Wrap a wire-format key blob.
    ///
    /// The blob must start with an SSH string naming the key algorithm.
    pub fn from_wire(blob: Vec<u8>) -> Result<Self, SshError> {
        let algorithm = read_algorithm_name(&blob)?;
        Ok(Self { algorithm, blob })
    }

    /// Convert a key received through russh
    pub fn from_public_key(key: &PublicKey) -> Result<Self, SshError> {
        Self::from_wire(key.public_key_bytes())
    }

    /// Algorithm name encoded in the blob (e.g. "ssh-ed25519")
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn render(&self, format: KeyFormat) -> String {
        match format {
            KeyFormat::AuthorizedKeys => {
                format!("{} {}", self.algorithm, BASE64.encode(&self.blob))
            }
            KeyFormat::Md5Fingerprint => colon_hex(&Md5::digest(&self.blob)),
            KeyFormat::Sha1Fingerprint => colon_hex(&Sha1::digest(&self.blob)),
            KeyFormat::Sha256Fingerprint => {
                let hash = Sha256::digest(&self.blob);
                format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
            }
        }
    }
}

/// The three renderings reported for each key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyRecord {
    #[serde(rename = "Key")]
    pub authorized_key: String,
    #[serde(rename = "MD5")]
    pub md5: String,
    #[serde(rename = "SHA1")]
    pub sha1: String,
}

impl KeyRecord {
    pub fn from_key(key: &HostKey) -> Self {
        Self {
            authorized_key: key.render(KeyFormat::AuthorizedKeys),
            md5: key.render(KeyFormat::Md5Fingerprint),
            sha1: key.render(KeyFormat::Sha1Fingerprint),
        }
    }
}

/// Lowercase two-digit hex octets joined by ':'
pub fn colon_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(':');
        }
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

fn read_algorithm_name(blob: &[u8]) -> Result<String, SshError> {
    let len_bytes: [u8; 4] = blob
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| SshError::KeyError("key blob shorter than length prefix".to_string()))?;
    let len = u32::from_be_bytes(len_bytes) as usize;

    if len == 0 || len > MAX_ALGORITHM_NAME_LEN {
        return Err(SshError::KeyError(format!(
            "invalid algorithm name length {}",
            len
        )));
    }

    let name = blob
        .get(4..4 + len)
        .ok_or_else(|| SshError::KeyError("key blob truncated in algorithm name".to_string()))?;

    if !name.iter().all(|b| b.is_ascii_graphic()) {
        return Err(SshError::KeyError(
            "algorithm name is not printable ASCII".to_string(),
        ));
    }

    // ASCII checked above
    Ok(String::from_utf8_lossy(name).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssh_string(out: &mut Vec<u8>, data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        out.extend_from_slice(data);
    }

    fn ed25519_blob(seed: u8) -> Vec<u8> {
        let mut blob = Vec::new();
        ssh_string(&mut blob, b"ssh-ed25519");
        ssh_string(&mut blob, &[seed; 32]);
        blob
    }

    fn rsa_blob() -> Vec<u8> {
        let mut blob = Vec::new();
        ssh_string(&mut blob, b"ssh-rsa");
        ssh_string(&mut blob, &[0x01, 0x00, 0x01]);
        let mut modulus = vec![0x00];
        modulus.extend((0..128u8).map(|i| i.wrapping_mul(37) | 0x80));
        ssh_string(&mut blob, &modulus);
        blob
    }

    fn plain_hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn test_colon_hex_known_digests() {
        assert_eq!(
            colon_hex(&Md5::digest(b"")),
            "d4:1d:8c:d9:8f:00:b2:04:e9:80:09:98:ec:f8:42:7e"
        );
        assert_eq!(
            colon_hex(&Sha1::digest(b"abc")),
            "a9:99:3e:36:47:06:81:6a:ba:3e:25:71:78:50:c2:6c:9c:d0:d8:9d"
        );
        assert_eq!(colon_hex(&[]), "");
        assert_eq!(colon_hex(&[0x0a]), "0a");
    }

    #[test]
    fn test_authorized_key_line() {
        let blob = ed25519_blob(7);
        let key = HostKey::from_wire(blob.clone()).unwrap();
        let line = key.render(KeyFormat::AuthorizedKeys);

        assert!(line.starts_with("ssh-ed25519 "));
        assert_eq!(line, line.trim());
        let (algorithm, payload) = line.split_once(' ').unwrap();
        assert_eq!(algorithm, "ssh-ed25519");
        assert!(!payload.contains(' '));
        assert_eq!(BASE64.decode(payload).unwrap(), blob);
    }

    #[test]
    fn test_fingerprint_shape() {
        let key = HostKey::from_wire(rsa_blob()).unwrap();
        let record = KeyRecord::from_key(&key);

        let md5_groups: Vec<&str> = record.md5.split(':').collect();
        assert_eq!(md5_groups.len(), 16);
        let sha1_groups: Vec<&str> = record.sha1.split(':').collect();
        assert_eq!(sha1_groups.len(), 20);

        for group in md5_groups.iter().chain(sha1_groups.iter()) {
            assert_eq!(group.len(), 2);
            assert!(group
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        }
    }

    #[test]
    fn test_fingerprints_match_independent_digests() {
        let blob = rsa_blob();
        let record = KeyRecord::from_key(&HostKey::from_wire(blob.clone()).unwrap());

        assert!(record.authorized_key.starts_with("ssh-rsa "));
        assert_eq!(record.md5.replace(':', ""), plain_hex(&Md5::digest(&blob)));
        assert_eq!(record.sha1.replace(':', ""), plain_hex(&Sha1::digest(&blob)));
    }

    #[test]
    fn test_deterministic() {
        let a = KeyRecord::from_key(&HostKey::from_wire(ed25519_blob(3)).unwrap());
        let b = KeyRecord::from_key(&HostKey::from_wire(ed25519_blob(3)).unwrap());
        assert_eq!(a, b);

        let c = KeyRecord::from_key(&HostKey::from_wire(ed25519_blob(4)).unwrap());
        assert_ne!(a.md5, c.md5);
        assert_ne!(a.sha1, c.sha1);
    }

    #[test]
    fn test_algorithm_follows_key_material() {
        let ed = HostKey::from_wire(ed25519_blob(1)).unwrap();
        let rsa = HostKey::from_wire(rsa_blob()).unwrap();
        assert_eq!(ed.algorithm(), "ssh-ed25519");
        assert_eq!(rsa.algorithm(), "ssh-rsa");

        let mut ecdsa = Vec::new();
        ssh_string(&mut ecdsa, b"ecdsa-sha2-nistp256");
        ssh_string(&mut ecdsa, b"nistp256");
        ssh_string(&mut ecdsa, &[0x04; 65]);
        let ecdsa = HostKey::from_wire(ecdsa).unwrap();
        assert!(ecdsa
            .render(KeyFormat::AuthorizedKeys)
            .starts_with("ecdsa-sha2-nistp256 "));
    }

    #[test]
    fn test_sha256_fingerprint_format() {
        let key = HostKey::from_wire(ed25519_blob(9)).unwrap();
        let fp = key.render(KeyFormat::Sha256Fingerprint);
        assert!(fp.starts_with("SHA256:"));
        assert!(!fp.ends_with('='));
        // 32 bytes -> 43 unpadded base64 chars
        assert_eq!(fp.len(), "SHA256:".len() + 43);
    }

    #[test]
    fn test_rejects_malformed_blobs() {
        assert!(HostKey::from_wire(Vec::new()).is_err());
        assert!(HostKey::from_wire(vec![0, 0, 0]).is_err());
        assert!(HostKey::from_wire(vec![0, 0, 0, 0]).is_err());
        assert!(HostKey::from_wire(vec![0, 0, 0, 11, b's', b's', b'h']).is_err());
        assert!(HostKey::from_wire(vec![0xff, 0xff, 0xff, 0xff, b'x']).is_err());
        assert!(HostKey::from_wire(vec![0, 0, 0, 3, b'a', b' ', b'b']).is_err());
    }

    #[test]
    fn test_round_trip_through_russh_key() {
        let blob = ed25519_blob(42);
        let line = HostKey::from_wire(blob.clone())
            .unwrap()
            .render(KeyFormat::AuthorizedKeys);

        let parsed = PublicKey::from_openssh(&line).unwrap();
        let key = HostKey::from_public_key(&parsed).unwrap();
        assert_eq!(key, HostKey::from_wire(blob).unwrap());
        assert_eq!(key.render(KeyFormat::AuthorizedKeys), line);
    }
}
