//! Resolver: turns one "peer appeared" notification into a filled peer.

use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use crate::browser::Peer;
use crate::error::{LookupError, ProviderError};
use crate::identity::username_of;
use crate::provider::{DiscoveryProvider, HostnameResolver};
use crate::SERVICE_TYPE;

/// Why a single resolve attempt failed. Terminal for that attempt only; a
/// later browse "added" event for the same peer spawns a fresh resolver.
#[derive(Debug, Error)]
pub(crate) enum ResolveError {
    #[error("resolve failed: {0}")]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// A short-lived query for one peer's contact details.
///
/// Runs two steps: resolve the service name to a hostname and port, then look
/// the hostname up to pick an address. The owning browser runs it as a task
/// in its in-flight set; aborting the task mid-lookup drops the pending
/// resolution, so no completion can fire afterwards.
pub(crate) struct Resolver {
    provider: Arc<dyn DiscoveryProvider>,
    lookup: Arc<dyn HostnameResolver>,
    service_name: String,
    domain: String,
    interface: u32,
}

impl Resolver {
    pub(crate) fn new(
        provider: Arc<dyn DiscoveryProvider>,
        lookup: Arc<dyn HostnameResolver>,
        service_name: String,
        domain: String,
        interface: u32,
    ) -> Self {
        Self {
            provider,
            lookup,
            service_name,
            domain,
            interface,
        }
    }

    pub(crate) async fn run(self) -> Result<Peer, ResolveError> {
        // Querying: service name -> hostname + port.
        let resolved = self
            .provider
            .resolve(&self.service_name, SERVICE_TYPE, &self.domain, self.interface)
            .await?;
        let port = u16::from_be(resolved.port);
        trace!(
            service = %self.service_name,
            hostname = %resolved.hostname,
            port,
            "service resolved, looking up hostname"
        );

        // AwaitingHostname: hostname -> address.
        let addresses = self.lookup.resolve(&resolved.hostname).await?;
        // The resolver contract guarantees a non-empty list on success; an
        // empty one is collaborator misbehaviour, not a runtime condition.
        let Some(address) = addresses.first().copied() else {
            panic!(
                "hostname resolver returned success with no addresses for {}",
                resolved.hostname
            );
        };

        Ok(Peer {
            username: username_of(&self.service_name).to_owned(),
            service_name: self.service_name,
            hostname: resolved.hostname,
            port,
            address,
        })
    }
}
