//! Endpoint value type.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

/// A peer endpoint: a bare IPv4 or IPv6 host literal.
///
/// The network decides the port, and two endpoints with the same host are
/// the same peer regardless of port. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(host: impl Into<String>) -> Self {
        Self(host.into())
    }

    /// The bare host literal.
    pub fn host(&self) -> &str {
        &self.0
    }

    /// Socket address for dialing. `None` for hosts that are not IP
    /// literals (eg. Tor hostnames a peer may have shared).
    pub fn socket_addr(&self, port: u16) -> Option<SocketAddr> {
        IpAddr::from_str(&self.0)
            .ok()
            .map(|ip| SocketAddr::new(ip, port))
    }

    /// `[host]:port` form, brackets always present so IPv6 literals stay
    /// unambiguous in the persisted file.
    pub fn bracketed(&self, port: u16) -> String {
        format!("[{}]:{}", self.0, port)
    }

    /// Parse the `[host]:port` form back into an endpoint, dropping the
    /// port. Used to warm-start a crawl from a persisted peer list.
    pub fn from_bracketed(entry: &str) -> Option<Self> {
        let host = entry.strip_prefix('[')?.split(']').next()?;
        if host.is_empty() {
            return None;
        }
        Some(Self::new(host))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(host: &str) -> Self {
        Self::new(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_host() {
        assert_eq!(Endpoint::new("10.0.0.1"), Endpoint::from("10.0.0.1"));
        assert_ne!(Endpoint::new("10.0.0.1"), Endpoint::new("10.0.0.2"));
    }

    #[test]
    fn brackets_are_always_present() {
        assert_eq!(Endpoint::new("127.0.0.1").bracketed(8333), "[127.0.0.1]:8333");
        assert_eq!(
            Endpoint::new("2001:db8::1").bracketed(18333),
            "[2001:db8::1]:18333"
        );
    }

    #[test]
    fn bracketed_form_parses_back() {
        let endpoint = Endpoint::new("2001:db8::1");
        assert_eq!(
            Endpoint::from_bracketed(&endpoint.bracketed(8333)),
            Some(endpoint)
        );
        assert_eq!(Endpoint::from_bracketed("10.0.0.1:8333"), None);
        assert_eq!(Endpoint::from_bracketed("[]:8333"), None);
    }

    #[test]
    fn non_ip_hosts_are_not_dialable() {
        assert!(Endpoint::new("2001:db8::1").socket_addr(8333).is_some());
        assert!(Endpoint::new("example.onion").socket_addr(8333).is_none());
    }
}
