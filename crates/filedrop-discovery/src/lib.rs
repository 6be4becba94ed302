//! mDNS/DNS-SD peer discovery for filedrop.
//!
//! Publishes the local instance's identity as a DNS-SD service and keeps a
//! de-duplicated directory of peers publishing the same service type on the
//! local network segment. The multicast-DNS machinery itself lives behind the
//! [`DiscoveryProvider`] trait; this crate orchestrates it:
//!
//! - [`LocalIdentity`] / [`IdentityHandle`] — who we are on the network
//!   (`username@suffix`) and what name the provider actually granted us.
//! - [`ServiceRecord`] — publishes the identity and records the verdict.
//! - [`Browser`] — subscribes to add/remove events, resolves each new peer
//!   into a reachable endpoint, and maintains the peer set.
//! - [`MdnsProvider`] — production backend over `mdns-sd`.

pub mod browser;
pub mod error;
pub mod identity;
pub mod mdns;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod provider;
pub mod record;
mod resolver;

pub use browser::{Browser, Peer, PeerEvent};
pub use error::{DiscoveryError, LookupError, ProviderError};
pub use identity::{IdentityHandle, LocalIdentity};
pub use mdns::MdnsProvider;
pub use provider::{BrowseEvent, DiscoveryProvider, DnsLookup, HostnameResolver, ResolvedService};
pub use record::ServiceRecord;

/// DNS-SD service type under which filedrop instances announce themselves.
pub const SERVICE_TYPE: &str = "_filedrop._tcp.local.";

/// Default DNS-SD browse/registration domain.
pub const DEFAULT_DOMAIN: &str = "local.";
