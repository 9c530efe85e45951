//! Static file serving
//!
//! Serves the web front end from a single directory:
//!   `/` -> `index.html`, `/app.js` -> `app.js`, ...
//!
//! Security:
//! - Percent-decoded paths are joined onto the root and canonicalized
//! - Anything resolving outside the root is refused
//! - No directory listing

use std::path::{Path, PathBuf};

use super::http::{percent_decode, Response};

const INDEX_FILE: &str = "index.html";

/// Serve `request_path` (already stripped of its query) from `root`.
pub async fn serve(root: &Path, request_path: &str) -> Response {
    let decoded = match percent_decode(request_path) {
        Some(d) => d,
        None => return Response::text(400, "Invalid URL encoding"),
    };
    if decoded.contains('\0') {
        return Response::text(400, "Invalid path");
    }

    let canonical_root = match tokio::fs::canonicalize(root).await {
        Ok(r) => r,
        Err(_) => return Response::text(404, "Not Found"),
    };

    let relative = decoded.trim_start_matches('/');
    let mut file_path = canonical_root.join(relative);
    if relative.is_empty() || decoded.ends_with('/') {
        file_path.push(INDEX_FILE);
    }

    let canonical = match resolve_inside(&canonical_root, &file_path).await {
        Ok(path) => path,
        Err(response) => return response,
    };

    let canonical = if tokio::fs::metadata(&canonical)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        match resolve_inside(&canonical_root, &canonical.join(INDEX_FILE)).await {
            Ok(path) => path,
            Err(_) => return Response::text(403, "Directory listing not allowed"),
        }
    } else {
        canonical
    };

    let body = match tokio::fs::read(&canonical).await {
        Ok(b) => b,
        Err(_) => return Response::text(404, "Not Found"),
    };

    let mime = mime_guess::from_path(&canonical).first_or_octet_stream();
    Response::new(200, mime.essence_str(), body)
}

/// Canonicalize `path` and verify it stays under `root`
async fn resolve_inside(root: &Path, path: &Path) -> Result<PathBuf, Response> {
    let canonical = tokio::fs::canonicalize(path)
        .await
        .map_err(|_| Response::text(404, "Not Found"))?;

    if !canonical.starts_with(root) {
        return Err(Response::text(403, "Path escapes static directory"));
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn site() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let root = dir.path().join("static");
        std::fs::create_dir_all(root.join("css")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("index.html"), "<h1>keys</h1>").unwrap();
        std::fs::write(root.join("css").join("site.css"), "body{}").unwrap();
        std::fs::write(root.join("my file.js"), "1").unwrap();
        std::fs::write(dir.path().join("secret.txt"), "nope").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_index() {
        let dir = site();
        let root = dir.path().join("static");

        let response = serve(&root, "/").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "text/html");
        assert_eq!(response.body, b"<h1>keys</h1>");
    }

    #[tokio::test]
    async fn test_nested_file_and_mime() {
        let dir = site();
        let root = dir.path().join("static");

        let response = serve(&root, "/css/site.css").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, "text/css");

        let response = serve(&root, "/my%20file.js").await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"1");
    }

    #[tokio::test]
    async fn test_escape_refused() {
        let dir = site();
        let root = dir.path().join("static");

        assert_eq!(serve(&root, "/../secret.txt").await.status, 403);
        assert_eq!(serve(&root, "/%2e%2e/secret.txt").await.status, 403);
    }

    #[tokio::test]
    async fn test_missing_and_directories() {
        let dir = site();
        let root = dir.path().join("static");

        assert_eq!(serve(&root, "/nope.html").await.status, 404);
        assert_eq!(serve(&root, "/empty").await.status, 403);
        assert_eq!(serve(&root, "/bad%zz").await.status, 400);
        assert_eq!(serve(&dir.path().join("missing"), "/").await.status, 404);
    }
}
