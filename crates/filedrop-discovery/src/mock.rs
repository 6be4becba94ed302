//! Mock collaborators for testing the discovery orchestration without a
//! network.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{LookupError, ProviderError};
use crate::provider::{BrowseEvent, DiscoveryProvider, HostnameResolver, ResolvedService};

/// One recorded `register` call.
#[derive(Debug, Clone)]
pub struct Registration {
    pub desired_name: String,
    pub service_type: String,
    /// As passed across the boundary: network byte order.
    pub port: u16,
}

#[derive(Default)]
struct MockProviderState {
    registrations: Vec<Registration>,
    unregistrations: Vec<String>,
    grants: HashMap<String, String>,
    register_failures: HashMap<String, ProviderError>,
    register_delay: Option<Duration>,
    resolve_results: HashMap<String, Result<ResolvedService, ProviderError>>,
    browse_tx: Option<mpsc::Sender<BrowseEvent>>,
}

/// Scriptable [`DiscoveryProvider`].
///
/// Tests push browse events with [`add_peer`](Self::add_peer) /
/// [`remove_peer`](Self::remove_peer), script per-name resolve and register
/// outcomes, and inspect recorded register/unregister calls.
#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockProviderState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant a different name than the requested one.
    pub fn grant_name(&self, desired: &str, granted: &str) {
        self.state
            .lock()
            .unwrap()
            .grants
            .insert(desired.to_owned(), granted.to_owned());
    }

    /// Fail registration of `desired` with the given error.
    pub fn fail_register(&self, desired: &str, error: ProviderError) {
        self.state
            .lock()
            .unwrap()
            .register_failures
            .insert(desired.to_owned(), error);
    }

    /// Make `register` record the call immediately but confirm only after
    /// `delay`, like a provider that puts the record on the air before the
    /// announcement comes back.
    pub fn delay_register(&self, delay: Duration) {
        self.state.lock().unwrap().register_delay = Some(delay);
    }

    /// Script a successful resolution for `service_name`. `port` is in host
    /// byte order and is converted at the boundary like a real provider.
    pub fn set_resolved(&self, service_name: &str, hostname: &str, port: u16) {
        self.state.lock().unwrap().resolve_results.insert(
            service_name.to_owned(),
            Ok(ResolvedService {
                hostname: hostname.to_owned(),
                port: port.to_be(),
            }),
        );
    }

    /// Fail resolution of `service_name` with the given error.
    pub fn fail_resolve(&self, service_name: &str, error: ProviderError) {
        self.state
            .lock()
            .unwrap()
            .resolve_results
            .insert(service_name.to_owned(), Err(error));
    }

    /// Announce a peer on the browse stream.
    ///
    /// # Panics
    /// If no browser has subscribed yet.
    pub async fn add_peer(&self, service_name: &str) {
        self.send(BrowseEvent::Added {
            service_name: service_name.to_owned(),
            interface: 0,
            domain: crate::DEFAULT_DOMAIN.to_owned(),
        })
        .await;
    }

    /// Withdraw a peer on the browse stream.
    pub async fn remove_peer(&self, service_name: &str) {
        self.send(BrowseEvent::Removed {
            service_name: service_name.to_owned(),
            interface: 0,
        })
        .await;
    }

    /// Recorded `register` calls.
    pub fn registrations(&self) -> Vec<Registration> {
        self.state.lock().unwrap().registrations.clone()
    }

    /// Recorded `unregister` calls.
    pub fn unregistrations(&self) -> Vec<String> {
        self.state.lock().unwrap().unregistrations.clone()
    }

    async fn send(&self, event: BrowseEvent) {
        let tx = self
            .state
            .lock()
            .unwrap()
            .browse_tx
            .clone()
            .expect("no browse subscription");
        tx.send(event).await.expect("browse receiver dropped");
    }
}

#[async_trait]
impl DiscoveryProvider for MockProvider {
    async fn register(
        &self,
        desired_name: &str,
        service_type: &str,
        port: u16,
    ) -> Result<String, ProviderError> {
        let (delay, outcome) = {
            let mut state = self.state.lock().unwrap();
            state.registrations.push(Registration {
                desired_name: desired_name.to_owned(),
                service_type: service_type.to_owned(),
                port,
            });
            let outcome = match state.register_failures.get(desired_name) {
                Some(error) => Err(*error),
                None => Ok(state
                    .grants
                    .get(desired_name)
                    .cloned()
                    .unwrap_or_else(|| desired_name.to_owned())),
            };
            (state.register_delay, outcome)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    async fn unregister(
        &self,
        service_name: &str,
        _service_type: &str,
    ) -> Result<(), ProviderError> {
        self.state
            .lock()
            .unwrap()
            .unregistrations
            .push(service_name.to_owned());
        Ok(())
    }

    async fn browse(
        &self,
        _service_type: &str,
    ) -> Result<mpsc::Receiver<BrowseEvent>, ProviderError> {
        let (tx, rx) = mpsc::channel(64);
        self.state.lock().unwrap().browse_tx = Some(tx);
        Ok(rx)
    }

    async fn resolve(
        &self,
        service_name: &str,
        _service_type: &str,
        _domain: &str,
        _interface: u32,
    ) -> Result<ResolvedService, ProviderError> {
        self.state
            .lock()
            .unwrap()
            .resolve_results
            .get(service_name)
            .cloned()
            .unwrap_or(Err(ProviderError::Unknown(-65537)))
    }
}

#[derive(Default)]
struct MockLookupState {
    entries: HashMap<String, Result<Vec<IpAddr>, String>>,
}

/// Scriptable [`HostnameResolver`]: a hostname-to-addresses table.
#[derive(Clone, Default)]
pub struct MockLookup {
    state: Arc<Mutex<MockLookupState>>,
}

impl MockLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, hostname: &str, addresses: Vec<IpAddr>) {
        self.state
            .lock()
            .unwrap()
            .entries
            .insert(hostname.to_owned(), Ok(addresses));
    }

    pub fn fail(&self, hostname: &str, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .entries
            .insert(hostname.to_owned(), Err(reason.to_owned()));
    }

    /// Script a contract-violating empty success (for fatal-path tests).
    pub fn insert_empty(&self, hostname: &str) {
        self.state
            .lock()
            .unwrap()
            .entries
            .insert(hostname.to_owned(), Ok(Vec::new()));
    }
}

#[async_trait]
impl HostnameResolver for MockLookup {
    async fn resolve(&self, hostname: &str) -> Result<Vec<IpAddr>, LookupError> {
        match self.state.lock().unwrap().entries.get(hostname) {
            Some(Ok(addrs)) => Ok(addrs.clone()),
            Some(Err(reason)) => Err(LookupError::new(reason.clone())),
            None => Err(LookupError::new(format!("{hostname}: unknown host"))),
        }
    }
}
