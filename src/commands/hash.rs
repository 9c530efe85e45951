//! Build identity
//!
//! Reports the SHA1 of the running executable so operators can tell which
//! build answered.

use std::path::Path;

use serde::Serialize;
use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Serialize)]
pub struct HashResponse {
    #[serde(rename = "Hash")]
    pub hash: String,
}

/// SHA1 of the current executable, lowercase hex
pub async fn executable_hash() -> std::io::Result<HashResponse> {
    let path = std::env::current_exe()?;
    let hash = sha1_file(&path).await?;
    Ok(HashResponse { hash })
}

pub async fn sha1_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_sha1_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        file.flush().unwrap();

        assert_eq!(
            sha1_file(file.path()).await.unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[tokio::test]
    async fn test_sha1_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(
            sha1_file(file.path()).await.unwrap(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
    }

    #[tokio::test]
    async fn test_executable_hash_shape() {
        let response = executable_hash().await.unwrap();
        assert_eq!(response.hash.len(), 40);
        assert!(response.hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_missing_file() {
        assert!(sha1_file(Path::new("/nonexistent/ssh-keycheck")).await.is_err());
    }
}
