//! Browser: the authoritative, de-duplicated, self-excluding peer directory.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::identity::IdentityHandle;
use crate::provider::{BrowseEvent, DiscoveryProvider, HostnameResolver};
use crate::resolver::{ResolveError, Resolver};
use crate::DiscoveryError;

/// A fully resolved remote instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Identifier as granted by the remote provider; the set key.
    pub service_name: String,
    /// Username portion of the service name.
    pub username: String,
    /// Hostname of the publishing machine.
    pub hostname: String,
    /// Listening port, host byte order.
    pub port: u16,
    /// First address reported for the hostname.
    pub address: IpAddr,
}

/// Changes to the peer directory, for the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A new peer was resolved and entered the directory.
    Added(Peer),
    /// A known peer re-announced with different contact details.
    Updated(Peer),
    /// A peer disappeared; carries its service name.
    Removed(String),
}

/// Browses the provider for filedrop instances and maintains the peer set.
///
/// Owns every [`Peer`] entry and every in-flight [`Resolver`]; both are torn
/// down with the browser. Resolution completions are processed in arrival
/// order, and nothing here assumes any ordering across distinct peers.
pub struct Browser {
    provider: Arc<dyn DiscoveryProvider>,
    lookup: Arc<dyn HostnameResolver>,
    browse_rx: mpsc::Receiver<BrowseEvent>,
    peers: HashMap<String, Peer>,
    resolving: JoinSet<Result<Peer, ResolveError>>,
    published_rx: watch::Receiver<String>,
    last_published: String,
    identity_gone: bool,
    events: mpsc::Sender<PeerEvent>,
}

impl Browser {
    /// Subscribe to the provider's browse stream for the filedrop service
    /// type. Peer changes are reported on `events`.
    pub async fn new(
        provider: Arc<dyn DiscoveryProvider>,
        lookup: Arc<dyn HostnameResolver>,
        identity: &IdentityHandle,
        events: mpsc::Sender<PeerEvent>,
    ) -> Result<Self, DiscoveryError> {
        let browse_rx = provider.browse(crate::SERVICE_TYPE).await?;
        let published_rx = identity.watch_published();
        let last_published = published_rx.borrow().clone();
        Ok(Self {
            provider,
            lookup,
            browse_rx,
            peers: HashMap::new(),
            resolving: JoinSet::new(),
            published_rx,
            last_published,
            identity_gone: false,
            events,
        })
    }

    /// Drive the browser until the provider's browse stream ends.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.browse_rx.recv() => match event {
                    Some(BrowseEvent::Added { service_name, interface, domain }) => {
                        self.spawn_resolver(service_name, domain, interface);
                    }
                    Some(BrowseEvent::Removed { service_name, .. }) => {
                        self.handle_removed(&service_name).await;
                    }
                    None => {
                        debug!("browse stream closed, stopping browser");
                        break;
                    }
                },
                Some(joined) = self.resolving.join_next() => {
                    match joined {
                        Ok(Ok(peer)) => self.handle_resolved(peer).await,
                        Ok(Err(e)) => {
                            // Terminal for this one peer only; it simply never
                            // appears. A re-announcement starts over.
                            warn!(error = %e, "peer resolution failed");
                        }
                        Err(e) if e.is_cancelled() => {}
                        // A resolver panic is a collaborator contract
                        // violation; propagate instead of limping on with an
                        // inconsistent directory.
                        Err(e) => std::panic::resume_unwind(e.into_panic()),
                    }
                }
                changed = self.published_rx.changed(), if !self.identity_gone => {
                    match changed {
                        Ok(()) => self.handle_published_transition().await,
                        Err(_) => self.identity_gone = true,
                    }
                }
            }
        }
    }

    fn spawn_resolver(&mut self, service_name: String, domain: String, interface: u32) {
        debug!(service = %service_name, "peer appeared, resolving");
        let resolver = Resolver::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.lookup),
            service_name,
            domain,
            interface,
        );
        self.resolving.spawn(resolver.run());
    }

    async fn handle_resolved(&mut self, peer: Peer) {
        if let Some(existing) = self.peers.get_mut(&peer.service_name) {
            // Re-announcement (or a duplicate add racing its own resolver):
            // refresh contact details in place, never duplicate the entry.
            if *existing != peer {
                *existing = peer.clone();
                let _ = self.events.send(PeerEvent::Updated(peer)).await;
            }
            return;
        }
        if peer.service_name == *self.published_rx.borrow() {
            debug!(service = %peer.service_name, "ignoring own published record");
            return;
        }
        debug!(service = %peer.service_name, address = %peer.address, "peer added");
        self.peers.insert(peer.service_name.clone(), peer.clone());
        let _ = self.events.send(PeerEvent::Added(peer)).await;
    }

    async fn handle_removed(&mut self, service_name: &str) {
        if service_name == *self.published_rx.borrow() {
            debug!(service = %service_name, "ignoring removal of own published record");
            return;
        }
        if self.peers.remove(service_name).is_some() {
            debug!(service = %service_name, "peer removed");
            let _ = self
                .events
                .send(PeerEvent::Removed(service_name.to_owned()))
                .await;
        } else {
            // Duplicate or out-of-order removal; benign either way.
            warn!(service = %service_name, "removal for unknown peer");
        }
    }

    /// The published name changed (registration, rename, or withdrawal).
    /// An entry tracked under the previous published name is our own stale
    /// record and must not linger as a discovered peer.
    async fn handle_published_transition(&mut self) {
        let current = self.published_rx.borrow_and_update().clone();
        let previous = std::mem::replace(&mut self.last_published, current);
        if previous.is_empty() {
            return;
        }
        if self.peers.remove(&previous).is_some() {
            debug!(service = %previous, "evicted stale self entry");
            let _ = self.events.send(PeerEvent::Removed(previous)).await;
        }
    }
}
