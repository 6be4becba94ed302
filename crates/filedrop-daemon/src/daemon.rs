//! Core daemon orchestration.

use std::sync::Arc;

use filedrop_discovery::{
    Browser, DiscoveryProvider, HostnameResolver, IdentityHandle, LocalIdentity, PeerEvent,
    ServiceRecord,
};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::DaemonError;

/// Commands from the application layer.
#[derive(Debug, Clone)]
pub enum DaemonCommand {
    /// The user renamed themselves; re-publish under the new name.
    SetUsername(String),
    /// Graceful shutdown.
    Shutdown,
}

/// Snapshot of the daemon's externally visible state.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    /// Username portion of the local identity.
    pub username: String,
    /// Name currently published on the network; empty if none.
    pub published_name: String,
    /// Number of discovered peers.
    pub peer_count: usize,
}

/// The filedrop daemon: hosts discovery and owns the identity lifecycle.
pub struct Daemon {
    identity: IdentityHandle,
    provider: Arc<dyn DiscoveryProvider>,
    lookup: Arc<dyn HostnameResolver>,
    command_tx: mpsc::Sender<DaemonCommand>,
    command_rx: mpsc::Receiver<DaemonCommand>,
    status_tx: watch::Sender<DaemonStatus>,
    events_tx: mpsc::Sender<PeerEvent>,
}

impl Daemon {
    /// Create a daemon. Returns the daemon and the channel on which peer
    /// events reach the application layer.
    ///
    /// `suffix` is the process-lifetime identity suffix (see
    /// [`setup::derive_suffix`](crate::setup::derive_suffix)).
    pub fn new(
        config: &Config,
        suffix: String,
        provider: Arc<dyn DiscoveryProvider>,
        lookup: Arc<dyn HostnameResolver>,
    ) -> (Self, mpsc::Receiver<PeerEvent>) {
        let identity = IdentityHandle::new(LocalIdentity::new(
            config.identity.username.clone(),
            suffix,
            config.network.port,
        ));
        let (command_tx, command_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(64);
        let (status_tx, _) = watch::channel(DaemonStatus {
            username: identity.username(),
            ..DaemonStatus::default()
        });

        let daemon = Self {
            identity,
            provider,
            lookup,
            command_tx,
            command_rx,
            status_tx,
            events_tx,
        };
        (daemon, events_rx)
    }

    /// Get a sender for feeding commands into the daemon.
    pub fn command_sender(&self) -> mpsc::Sender<DaemonCommand> {
        self.command_tx.clone()
    }

    /// Subscribe to status snapshots.
    pub fn status_receiver(&self) -> watch::Receiver<DaemonStatus> {
        self.status_tx.subscribe()
    }

    /// Run the daemon event loop until shutdown.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        let (peer_tx, mut peer_rx) = mpsc::channel(64);
        let browser = Browser::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.lookup),
            &self.identity,
            peer_tx,
        )
        .await?;
        let browser_task = tokio::spawn(browser.run());

        let mut requested_rx = self.identity.watch_requested();
        requested_rx.mark_unchanged();
        let mut published_rx = self.identity.watch_published();

        let mut record = Some(ServiceRecord::register(
            Arc::clone(&self.provider),
            self.identity.clone(),
        ));
        info!(requested = %self.identity.requested_name(), "daemon running");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(DaemonCommand::SetUsername(username)) => {
                        // The requested-name watch below drives re-registration.
                        if !self.identity.set_username(&username) {
                            debug!(username = %username, "username unchanged");
                        }
                    }
                    Some(DaemonCommand::Shutdown) | None => {
                        info!("shutting down");
                        break;
                    }
                },
                changed = requested_rx.changed() => {
                    if changed.is_ok() {
                        let requested = requested_rx.borrow_and_update().clone();
                        info!(requested = %requested, "identity changed, re-registering");
                        // Tear the old record down first: one record per
                        // identity at a time, and the old published name must
                        // be cleared before the new registration lands.
                        drop(record.take());
                        record = Some(ServiceRecord::register(
                            Arc::clone(&self.provider),
                            self.identity.clone(),
                        ));
                        self.update_status(|status| {
                            status.username = self.identity.username();
                        });
                    }
                },
                changed = published_rx.changed() => {
                    if changed.is_ok() {
                        let published = published_rx.borrow_and_update().clone();
                        self.update_status(|status| {
                            status.published_name = published;
                        });
                    }
                },
                event = peer_rx.recv() => match event {
                    Some(event) => self.handle_peer_event(event).await,
                    None => {
                        debug!("browser stopped");
                        break;
                    }
                },
            }
        }

        // Withdraw the record before returning so the goodbye reaches the
        // network even when the runtime goes down right after.
        if let Some(record) = record.take() {
            record.shutdown().await;
        }
        browser_task.abort();
        let _ = browser_task.await;
        info!("daemon stopped");
        Ok(())
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        match &event {
            PeerEvent::Added(peer) => {
                info!(peer = %peer.service_name, address = %peer.address, "peer discovered");
                self.update_status(|status| status.peer_count += 1);
            }
            PeerEvent::Removed(service_name) => {
                info!(peer = %service_name, "peer gone");
                self.update_status(|status| {
                    status.peer_count = status.peer_count.saturating_sub(1);
                });
            }
            PeerEvent::Updated(peer) => {
                debug!(peer = %peer.service_name, "peer details updated");
            }
        }
        // The application layer may not be listening; that's fine.
        let _ = self.events_tx.send(event).await;
    }

    fn update_status(&self, f: impl FnOnce(&mut DaemonStatus)) {
        self.status_tx.send_modify(f);
    }
}
