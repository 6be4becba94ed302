//! Boundary traits for the external collaborators: the service-discovery
//! provider and the hostname resolver.
//!
//! Port values cross the provider boundary in network byte order, as they do
//! on the wire: produced with [`u16::to_be`] on the register path and decoded
//! with [`u16::from_be`] on the resolve path.

use std::net::IpAddr;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{LookupError, ProviderError};

/// One notification from the provider's browse stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseEvent {
    /// A service instance appeared on the network.
    Added {
        service_name: String,
        interface: u32,
        domain: String,
    },
    /// A service instance disappeared.
    Removed { service_name: String, interface: u32 },
}

/// Result of resolving a service name to an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    /// Hostname of the machine publishing the service.
    pub hostname: String,
    /// Port in network byte order.
    pub port: u16,
}

/// A multicast-DNS-style service discovery provider.
///
/// All calls are asynchronous; each completes at most once, with success or
/// failure, never both. No ordering is defined across distinct calls.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync + 'static {
    /// Publish a service instance. Returns the granted instance name, which
    /// may differ from the desired one (conflict disambiguation or
    /// truncation by the provider).
    ///
    /// `port` is in network byte order.
    async fn register(
        &self,
        desired_name: &str,
        service_type: &str,
        port: u16,
    ) -> Result<String, ProviderError>;

    /// Withdraw a previously registered instance.
    async fn unregister(&self, service_name: &str, service_type: &str)
        -> Result<(), ProviderError>;

    /// Start browsing for instances of `service_type`. Events arrive on the
    /// returned channel until the receiver is dropped.
    async fn browse(&self, service_type: &str)
        -> Result<mpsc::Receiver<BrowseEvent>, ProviderError>;

    /// Resolve one instance to a hostname and port (network byte order).
    async fn resolve(
        &self,
        service_name: &str,
        service_type: &str,
        domain: &str,
        interface: u32,
    ) -> Result<ResolvedService, ProviderError>;
}

/// Asynchronous hostname-to-address resolution.
///
/// Contract: a successful result is a non-empty, ordered address list.
#[async_trait]
pub trait HostnameResolver: Send + Sync + 'static {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError>;
}

/// Production hostname resolver backed by the system resolver via
/// [`tokio::net::lookup_host`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsLookup;

#[async_trait]
impl HostnameResolver for DnsLookup {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError> {
        // lookup_host wants a socket address; the port is irrelevant here.
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((hostname, 0_u16))
            .await
            .map_err(|e| LookupError::new(format!("{hostname}: {e}")))?
            .map(|sa| sa.ip())
            .collect();
        if addrs.is_empty() {
            // Uphold the non-empty success contract for downstream consumers.
            return Err(LookupError::new(format!("{hostname}: no addresses")));
        }
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dns_lookup_resolves_localhost() {
        let addrs = DnsLookup.resolve("localhost").await.unwrap();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(IpAddr::is_loopback));
    }

    #[tokio::test]
    async fn dns_lookup_fails_for_bogus_host() {
        let err = DnsLookup
            .resolve("no-such-host.invalid")
            .await
            .expect_err("resolution should fail");
        assert!(err.reason.contains("no-such-host.invalid"));
    }

    #[test]
    fn port_byte_order_round_trips() {
        let on_wire = 5000_u16.to_be();
        assert_eq!(u16::from_be(on_wire), 5000);
    }
}
