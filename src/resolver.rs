//! Async DNS endpoint resolution
//!
//! A thin wrapper over the runtime's resolver that turns a host/port pair
//! into the ordered endpoint list a connector walks. Cancellation follows
//! the task model: aborting the task that awaits the lookup abandons it.

use crate::error::{Error, Result};
use std::net::SocketAddr;
use tracing::debug;

/// Resolve `host:port` into one or more socket addresses.
///
/// An empty result set is reported as [`Error::Resolve`]; OS resolver
/// failures pass through as [`Error::Io`].
pub async fn resolve_endpoints(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let endpoints: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(Error::Io)?
        .collect();
    if endpoints.is_empty() {
        return Err(Error::resolve(host, port));
    }
    debug!(host, port, count = endpoints.len(), "resolved endpoints");
    Ok(endpoints)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_loopback() {
        let endpoints = resolve_endpoints("localhost", 4000)
            .await
            .expect("localhost resolves");
        assert!(!endpoints.is_empty());
        assert!(endpoints.iter().all(|e| e.port() == 4000));
        assert!(endpoints.iter().all(|e| e.ip().is_loopback()));
    }

    #[tokio::test]
    async fn test_resolve_literal_address() {
        let endpoints = resolve_endpoints("127.0.0.1", 9999)
            .await
            .expect("literal resolves");
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0], "127.0.0.1:9999".parse().expect("addr"));
    }
}
