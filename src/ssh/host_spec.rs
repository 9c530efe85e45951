//! Host specification parsing
//!
//! Turns user-supplied host text into a `host:port` dial target.
//! Accepted forms:
//! - `host:port` / `[host]:port`: used verbatim
//! - `hostname`, `1.2.3.4`: port 22 appended
//! - `::1`: bracketed, port 22 appended

use std::net::{IpAddr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Port assumed when the host text carries none
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Longest DNS name accepted, not counting dots
const MAX_DNS_NAME_LEN: usize = 255;

static DNS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9_][a-zA-Z0-9_-]{0,62})(\.[a-zA-Z0-9_][a-zA-Z0-9_-]{0,62})*[._]?$")
        .expect("static DNS name pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostSpecError {
    #[error("Empty host")]
    Empty,

    #[error("Invalid hostname: {0}")]
    InvalidHost(String),
}

/// Normalize raw host text into a dial target.
pub fn normalize(raw: &str) -> Result<String, HostSpecError> {
    let host = raw.trim();
    if host.is_empty() {
        return Err(HostSpecError::Empty);
    }

    if is_dial_string(host) {
        return Ok(host.to_string());
    }

    if host.parse::<Ipv6Addr>().is_ok() {
        return Ok(format!("[{}]:{}", host, DEFAULT_SSH_PORT));
    }

    if is_host(host) {
        return Ok(format!("{}:{}", host, DEFAULT_SSH_PORT));
    }

    Err(HostSpecError::InvalidHost(host.to_string()))
}

/// `host:port` with a valid host and a port in 1..=65535
pub fn is_dial_string(s: &str) -> bool {
    match split_host_port(s) {
        Some((host, port)) => is_host(host) && parse_port(port).is_some(),
        None => false,
    }
}

/// Hostname in DNS syntax or an IP literal
pub fn is_host(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok() || is_dns_name(s)
}

fn is_dns_name(s: &str) -> bool {
    if s.is_empty() || s.chars().filter(|c| *c != '.').count() > MAX_DNS_NAME_LEN {
        return false;
    }
    // Dotted quads that failed IP parsing (e.g. 300.1.1.1) still read as names
    s.parse::<IpAddr>().is_err() && DNS_NAME.is_match(s)
}

fn parse_port(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match s.parse::<u16>() {
        Ok(0) | Err(_) => None,
        Ok(port) => Some(port),
    }
}

/// Split `host:port` or `[host]:port`. Unbracketed hosts may not contain ':'.
fn split_host_port(s: &str) -> Option<(&str, &str)> {
    if let Some(rest) = s.strip_prefix('[') {
        let (host, port) = rest.split_once("]:")?;
        if host.contains(['[', ']']) {
            return None;
        }
        return Some((host, port));
    }

    let (host, port) = s.rsplit_once(':')?;
    if host.contains([':', '[', ']']) {
        return None;
    }
    Some((host, port))
}
