//! Minimal HTTP/1.1 request reader and response writer
//!
//! One request per connection, `Connection: close` on every response.
//! Bodies must carry `Content-Length`; chunked uploads are refused.

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest request line or header line
const MAX_LINE_LEN: usize = 8 * 1024;
/// Header lines accepted before giving up
const MAX_HEADERS: usize = 100;
/// Largest request body accepted
pub const MAX_BODY_LEN: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Connection closed")]
    Closed,

    #[error("Malformed request line")]
    BadRequestLine,

    #[error("Malformed header")]
    BadHeader,

    #[error("Header line too long")]
    LineTooLong,

    #[error("Too many headers")]
    TooManyHeaders,

    #[error("Invalid Content-Length")]
    BadContentLength,

    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("Transfer-Encoding not supported")]
    UnsupportedTransferEncoding,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Status to answer with, if the peer is still worth answering
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Closed | HttpError::Io(_) => None,
            HttpError::LineTooLong => Some(431),
            HttpError::TooManyHeaders => Some(431),
            HttpError::BodyTooLarge(_) => Some(413),
            HttpError::UnsupportedTransferEncoding => Some(501),
            HttpError::BadRequestLine | HttpError::BadHeader | HttpError::BadContentLength => {
                Some(400)
            }
        }
    }
}

/// A parsed request
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Request target without query string
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or(&self.target)
    }
}

/// Read one request: request line, headers, then `Content-Length` bytes.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = match read_line(reader).await? {
        Some(line) => line,
        None => return Err(HttpError::Closed),
    };

    // "POST /check HTTP/1.1"
    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => return Err(HttpError::BadRequestLine),
    };
    if !version.starts_with("HTTP/1.") || (!target.starts_with('/') && target != "*") {
        return Err(HttpError::BadRequestLine);
    }

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader).await?.ok_or(HttpError::Closed)?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(HttpError::TooManyHeaders);
        }
        let (name, value) = line.split_once(':').ok_or(HttpError::BadHeader)?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(HttpError::BadHeader);
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    let mut request = Request {
        method: method.to_string(),
        target: target.to_string(),
        headers,
        body: Vec::new(),
    };

    if request.header("transfer-encoding").is_some() {
        return Err(HttpError::UnsupportedTransferEncoding);
    }

    let content_length = match request.header("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| HttpError::BadContentLength)?,
        None => 0,
    };
    if content_length > MAX_BODY_LEN {
        return Err(HttpError::BodyTooLarge(MAX_BODY_LEN));
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).await?;
    request.body = body;

    Ok(request)
}

/// Read a CRLF (or LF) terminated line; `None` on clean EOF.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(None);
    }
    if !buf.ends_with(b"\n") {
        return if buf.len() > MAX_LINE_LEN {
            Err(HttpError::LineTooLong)
        } else {
            Err(HttpError::Closed)
        };
    }

    let line = String::from_utf8(buf).map_err(|_| HttpError::BadHeader)?;
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// A response ready to be written
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body,
        }
    }

    pub fn text(status: u16, message: &str) -> Self {
        Self::new(status, "text/plain; charset=utf-8", message.as_bytes().to_vec())
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status, "application/json; charset=utf-8", body),
            Err(e) => {
                tracing::error!("Failed to encode response: {}", e);
                Self::text(500, "Internal Server Error")
            }
        }
    }

    /// `{"Error": message}`
    pub fn json_error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "Error": message }))
    }

    /// Serialize status line, headers and (unless `head_only`) the body.
    pub fn encode(&self, head_only: bool) -> Vec<u8> {
        let header = format!(
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Access-Control-Allow-Origin: *\r\n\
             Access-Control-Allow-Methods: GET, HEAD, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type\r\n\
             Cache-Control: no-cache\r\n\
             Connection: close\r\n\
             \r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        );
        let mut out = header.into_bytes();
        if !head_only {
            out.extend_from_slice(&self.body);
        }
        out
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}

/// Simple percent-decoding for URL paths.
pub fn percent_decode(input: &str) -> Option<String> {
    let mut out = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return None;
            }
            let hi = char::from(bytes[i + 1]).to_digit(16)?;
            let lo = char::from(bytes[i + 2]).to_digit(16)?;
            out.push((hi * 16 + lo) as u8);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
