//! Backend URL validation
//!
//! The backend address must be a WebSocket URL (`ws://` or `wss://`) with a
//! host, no embedded credentials and no fragment (RFC 6455 forbids fragments
//! in WebSocket URIs). Credentials belong in the `auth_token` setting, which is
//! sent as a header and zeroized on drop.
//!
//! Plain `ws://` is accepted everywhere but logged when the host is not a
//! local or private address.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use tracing::warn;
use url::Url;

/// Errors that can occur during URL validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be ws or wss, got: {0}")]
    UnsupportedScheme(String),

    #[error("URL must have a host")]
    MissingHost,

    #[error("URL must not embed credentials; use auth_token instead")]
    CredentialsNotAllowed,

    #[error("WebSocket URL must not have a fragment")]
    FragmentNotAllowed,
}

/// Checks if an IPv4 address is loopback, private, link-local or CGNAT.
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    if ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified() {
        return true;
    }
    // Shared address space (CGNAT) 100.64.0.0/10
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0xC0) == 64
}

/// Checks if an IPv6 address is loopback, unique-local or link-local.
pub fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    let segments = ip.segments();
    // Unique local fc00::/7
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    // Link-local fe80::/10
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    // IPv4-mapped
    ip.to_ipv4_mapped().is_some_and(|v4| is_private_ipv4(&v4))
}

pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => is_private_ipv6(v6),
    }
}

/// Whether the URL's host is this machine or a private network address.
pub fn is_local_host(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => {
            domain.eq_ignore_ascii_case("localhost") || domain.ends_with(".localhost")
        }
        Some(url::Host::Ipv4(ip)) => is_private_ipv4(&ip),
        Some(url::Host::Ipv6(ip)) => is_private_ipv6(&ip),
        None => false,
    }
}

/// Validates a backend WebSocket URL and returns it parsed.
///
/// # Example
/// ```rust
/// use live_session::utils::url_validation::validate_backend_url;
///
/// assert!(validate_backend_url("wss://voice.example.com/ws").is_ok());
/// assert!(validate_backend_url("ws://localhost:8081/ws").is_ok());
/// assert!(validate_backend_url("https://voice.example.com/ws").is_err());
/// ```
pub fn validate_backend_url(url: &str) -> Result<Url, UrlValidationError> {
    let parsed = Url::parse(url)?;

    let scheme = parsed.scheme();
    if scheme != "ws" && scheme != "wss" {
        return Err(UrlValidationError::UnsupportedScheme(scheme.to_string()));
    }

    if parsed.host().is_none() {
        return Err(UrlValidationError::MissingHost);
    }

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(UrlValidationError::CredentialsNotAllowed);
    }

    if parsed.fragment().is_some() {
        return Err(UrlValidationError::FragmentNotAllowed);
    }

    if scheme == "ws" && !is_local_host(&parsed) {
        warn!(
            host = parsed.host_str().unwrap_or_default(),
            "Backend URL uses unencrypted ws:// to a non-local host"
        );
    }

    Ok(parsed)
}
