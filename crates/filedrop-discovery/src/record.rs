//! Service record: publishes the local identity to the provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::identity::IdentityHandle;
use crate::provider::DiscoveryProvider;
use crate::SERVICE_TYPE;

/// A live registration of the local identity with the provider.
///
/// Registers the requested name at construction and stores whatever name the
/// provider grants into the identity. A failed registration is logged and the
/// record goes inert; there is no retry — re-registration after an identity
/// change means dropping this record and creating a new one, which is the
/// hosting layer's job. At most one record per identity is alive at a time.
///
/// Tearing the record down withdraws the registration and clears the
/// published name, so a subsequent record starts clean. A provider may put
/// the record on the air before confirming it, so teardown withdraws the
/// requested name even when no grant arrived, unless registration is known
/// to have failed. [`shutdown`](Self::shutdown) waits for the withdrawal;
/// plain drop spawns it.
pub struct ServiceRecord {
    identity: IdentityHandle,
    provider: Arc<dyn DiscoveryProvider>,
    requested: String,
    register_failed: Arc<AtomicBool>,
    registration: AbortHandle,
    torn_down: bool,
}

impl ServiceRecord {
    /// Start registering `identity.requested_name()` under the filedrop
    /// service type.
    pub fn register(provider: Arc<dyn DiscoveryProvider>, identity: IdentityHandle) -> Self {
        let requested = identity.requested_name();
        // Port crosses the provider boundary in network byte order.
        let port = identity.port().to_be();
        let register_failed = Arc::new(AtomicBool::new(false));

        let task_identity = identity.clone();
        let task_provider = Arc::clone(&provider);
        let task_requested = requested.clone();
        let task_failed = Arc::clone(&register_failed);
        let registration = tokio::spawn(async move {
            match task_provider
                .register(&task_requested, SERVICE_TYPE, port)
                .await
            {
                Ok(granted) => {
                    if granted == task_requested {
                        info!(name = %granted, "service registered");
                    } else {
                        info!(
                            requested = %task_requested,
                            granted = %granted,
                            "service registered under provider-adjusted name"
                        );
                    }
                    task_identity.set_published_name(granted);
                }
                Err(e) => {
                    task_failed.store(true, Ordering::Release);
                    warn!(name = %task_requested, error = %e, "service registration failed");
                }
            }
        })
        .abort_handle();

        Self {
            identity,
            provider,
            requested,
            register_failed,
            registration,
            torn_down: false,
        }
    }

    /// Withdraw the registration and wait for the provider to confirm.
    pub async fn shutdown(mut self) {
        self.registration.abort();
        self.torn_down = true;
        if let Some(name) = self.withdrawal_name() {
            if let Err(e) = self.provider.unregister(&name, SERVICE_TYPE).await {
                debug!(name = %name, error = %e, "unregister failed");
            }
        }
    }

    /// Which name to withdraw, clearing the published name as a side effect.
    /// Without a recorded grant the record may still be on the air under the
    /// requested name (registration aborted mid-confirmation), so only a
    /// known registration failure skips the withdrawal.
    fn withdrawal_name(&self) -> Option<String> {
        let published = self.identity.published_name();
        self.identity.clear_published_name();
        if !published.is_empty() {
            Some(published)
        } else if self.register_failed.load(Ordering::Acquire) {
            None
        } else {
            Some(self.requested.clone())
        }
    }
}

impl Drop for ServiceRecord {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        self.registration.abort();
        if let Some(name) = self.withdrawal_name() {
            let provider = Arc::clone(&self.provider);
            tokio::spawn(async move {
                if let Err(e) = provider.unregister(&name, SERVICE_TYPE).await {
                    debug!(name = %name, error = %e, "unregister failed");
                }
            });
        }
    }
}
