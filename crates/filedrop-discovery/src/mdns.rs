//! Production [`DiscoveryProvider`] backed by the `mdns-sd` daemon.
//!
//! `mdns-sd` resolves instances as a side effect of browsing, so this adapter
//! pumps the browse stream into [`BrowseEvent`]s while caching resolved
//! records; `resolve` answers from that cache, or parks until the pump sees
//! the record. Registration is confirmed through the daemon monitor's
//! announcement event.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mdns_sd::{DaemonEvent, ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::ProviderError;
use crate::provider::{BrowseEvent, DiscoveryProvider, ResolvedService};
use crate::DEFAULT_DOMAIN;

/// Strip the service-type suffix from a DNS-SD full name.
fn instance_name(fullname: &str, service_type: &str) -> Option<String> {
    fullname
        .strip_suffix(service_type)
        .and_then(|s| s.strip_suffix('.'))
        .map(str::to_owned)
}

/// `mdns-sd` reports string errors rather than native DNS-SD codes, so the
/// taxonomy mapping is best-effort with `Unknown` as the fallback.
fn map_mdns_error(e: &mdns_sd::Error) -> ProviderError {
    debug!(error = %e, "mdns-sd error");
    let msg = e.to_string().to_lowercase();
    if msg.contains("not running") || msg.contains("closed") || msg.contains("disconnected") {
        ProviderError::ServiceNotRunning
    } else if msg.contains("invalid") || msg.contains("parse") {
        ProviderError::BadParameter
    } else {
        ProviderError::Unknown(-65537)
    }
}

#[derive(Default)]
struct ResolveState {
    cache: HashMap<String, ResolvedService>,
    pending: HashMap<String, Vec<oneshot::Sender<ResolvedService>>>,
}

impl ResolveState {
    /// Drop everything known about an instance. Parked waiters see their
    /// channel close, failing the resolve call for a name that vanished
    /// before it ever resolved.
    fn forget(&mut self, name: &str) {
        self.cache.remove(name);
        self.pending.remove(name);
    }
}

/// Service discovery over the local `mdns-sd` daemon.
pub struct MdnsProvider {
    daemon: ServiceDaemon,
    resolve_state: Arc<Mutex<ResolveState>>,
}

impl MdnsProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let daemon = ServiceDaemon::new().map_err(|e| map_mdns_error(&e))?;
        Ok(Self {
            daemon,
            resolve_state: Arc::new(Mutex::new(ResolveState::default())),
        })
    }

    fn local_host_name() -> String {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "filedrop".to_owned());
        format!("{host}.local.")
    }
}

#[async_trait]
impl DiscoveryProvider for MdnsProvider {
    async fn register(
        &self,
        desired_name: &str,
        service_type: &str,
        port: u16,
    ) -> Result<String, ProviderError> {
        let info = ServiceInfo::new(
            service_type,
            desired_name,
            &Self::local_host_name(),
            "",
            u16::from_be(port),
            None,
        )
        .map_err(|e| map_mdns_error(&e))?
        .enable_addr_auto();
        let fullname = info.get_fullname().to_owned();

        let monitor = self.daemon.monitor().map_err(|e| map_mdns_error(&e))?;
        self.daemon.register(info).map_err(|e| map_mdns_error(&e))?;

        // The daemon announces the record once it is actually on the air;
        // that announcement carries the name as granted.
        loop {
            match monitor.recv_async().await {
                Ok(DaemonEvent::Announce(name, addresses)) if name == fullname => {
                    trace!(name = %name, addresses = %addresses, "service announced");
                    return Ok(instance_name(&name, service_type).unwrap_or(name));
                }
                Ok(_) => {}
                Err(_) => return Err(ProviderError::ServiceNotRunning),
            }
        }
    }

    async fn unregister(
        &self,
        service_name: &str,
        service_type: &str,
    ) -> Result<(), ProviderError> {
        let fullname = format!("{service_name}.{service_type}");
        let status = self
            .daemon
            .unregister(&fullname)
            .map_err(|e| map_mdns_error(&e))?;
        // Wait for the daemon to confirm; the outcome itself is uninteresting.
        let _ = status.recv_async().await;
        Ok(())
    }

    async fn browse(
        &self,
        service_type: &str,
    ) -> Result<mpsc::Receiver<BrowseEvent>, ProviderError> {
        let events = self
            .daemon
            .browse(service_type)
            .map_err(|e| map_mdns_error(&e))?;
        let (tx, rx) = mpsc::channel(64);
        let resolve_state = Arc::clone(&self.resolve_state);
        let daemon = self.daemon.clone();
        let service_type = service_type.to_owned();

        tokio::spawn(async move {
            while let Ok(event) = events.recv_async().await {
                match event {
                    ServiceEvent::ServiceFound(_, fullname) => {
                        let Some(name) = instance_name(&fullname, &service_type) else {
                            continue;
                        };
                        let added = BrowseEvent::Added {
                            service_name: name,
                            interface: 0,
                            domain: DEFAULT_DOMAIN.to_owned(),
                        };
                        if tx.send(added).await.is_err() {
                            break;
                        }
                    }
                    ServiceEvent::ServiceResolved(info) => {
                        let Some(name) = instance_name(info.get_fullname(), &service_type)
                        else {
                            continue;
                        };
                        let resolved = ResolvedService {
                            hostname: info.get_hostname().to_owned(),
                            port: info.get_port().to_be(),
                        };
                        let waiters = {
                            let mut state = resolve_state.lock().unwrap();
                            state.cache.insert(name.clone(), resolved.clone());
                            state.pending.remove(&name).unwrap_or_default()
                        };
                        for waiter in waiters {
                            let _ = waiter.send(resolved.clone());
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        let Some(name) = instance_name(&fullname, &service_type) else {
                            continue;
                        };
                        resolve_state.lock().unwrap().forget(&name);
                        let removed = BrowseEvent::Removed {
                            service_name: name,
                            interface: 0,
                        };
                        if tx.send(removed).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
            // Subscriber gone or daemon shut down: stop browsing and fail any
            // parked resolve calls by dropping their senders.
            let _ = daemon.stop_browse(&service_type);
            resolve_state.lock().unwrap().pending.clear();
            debug!(service_type = %service_type, "browse pump stopped");
        });

        Ok(rx)
    }

    async fn resolve(
        &self,
        service_name: &str,
        _service_type: &str,
        _domain: &str,
        _interface: u32,
    ) -> Result<ResolvedService, ProviderError> {
        let pending = {
            let mut state = self.resolve_state.lock().unwrap();
            if let Some(resolved) = state.cache.get(service_name) {
                return Ok(resolved.clone());
            }
            let (tx, rx) = oneshot::channel();
            state
                .pending
                .entry(service_name.to_owned())
                .or_default()
                .push(tx);
            rx
        };
        match pending.await {
            Ok(resolved) => Ok(resolved),
            Err(_) => {
                warn!(service = %service_name, "browse pump stopped before resolution");
                Err(ProviderError::ServiceNotRunning)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_strips_type_suffix() {
        assert_eq!(
            instance_name("alice@host1._filedrop._tcp.local.", "_filedrop._tcp.local.")
                .as_deref(),
            Some("alice@host1")
        );
    }

    #[test]
    fn instance_name_rejects_foreign_types() {
        assert_eq!(
            instance_name("printer._ipp._tcp.local.", "_filedrop._tcp.local."),
            None
        );
    }

    #[test]
    fn removal_drops_parked_resolve_waiters() {
        let mut state = ResolveState::default();
        let (tx, mut rx) = oneshot::channel::<ResolvedService>();
        state.pending.entry("bob@host2".to_owned()).or_default().push(tx);
        state.cache.insert(
            "bob@host2".to_owned(),
            ResolvedService {
                hostname: "host2.local.".to_owned(),
                port: 5000_u16.to_be(),
            },
        );

        state.forget("bob@host2");

        assert!(state.cache.is_empty());
        assert!(state.pending.is_empty());
        // The closed channel is what fails a parked resolve call.
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
