//! Local identity: the name this instance publishes on the network.
//!
//! An identity is `username@suffix`, where the suffix disambiguates equal
//! usernames across machines. The suffix is derived once from the local host
//! name (or a random numeric token when no host name is available) and never
//! changes for the process lifetime. The provider may grant a different name
//! than the one requested; whatever it grants is the published name.

use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::sync::watch;
use tracing::debug;

/// Compose a service name from a username and suffix.
pub fn service_name_of(username: &str, suffix: &str) -> String {
    format!("{username}@{suffix}")
}

/// Extract the username portion of a service name.
///
/// Strips everything from the last `@` onwards. Names without an `@` are
/// returned unchanged, for peers predating the `username@suffix` convention.
pub fn username_of(service_name: &str) -> &str {
    match service_name.rfind('@') {
        Some(at) => &service_name[..at],
        None => service_name,
    }
}

/// Derive the identity suffix: the local host name, or a numeric token drawn
/// from `rng` when the host name is unavailable or empty.
pub fn default_suffix<R: Rng>(rng: &mut R) -> String {
    suffix_or_token(hostname::get().ok().and_then(|h| h.into_string().ok()), rng)
}

fn suffix_or_token<R: Rng>(host: Option<String>, rng: &mut R) -> String {
    match host {
        Some(host) if !host.is_empty() => host,
        _ => rng.gen_range(0..1_000_000_u32).to_string(),
    }
}

/// The local user's identity: chosen username, fixed suffix, listening port,
/// and the name the provider actually granted (empty until registration
/// succeeds, cleared again when the record is withdrawn).
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    username: String,
    suffix: String,
    port: u16,
    published_name: String,
}

impl LocalIdentity {
    pub fn new(username: impl Into<String>, suffix: impl Into<String>, port: u16) -> Self {
        Self {
            username: username.into(),
            suffix: suffix.into(),
            port,
            published_name: String::new(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The name we ask the provider to publish.
    pub fn requested_name(&self) -> String {
        service_name_of(&self.username, &self.suffix)
    }

    /// The name the provider granted, or empty if no record is live.
    pub fn published_name(&self) -> &str {
        &self.published_name
    }
}

struct IdentityShared {
    state: Mutex<LocalIdentity>,
    /// Requested name; changes when the user renames themselves.
    requested: watch::Sender<String>,
    /// Published name as granted by the provider; empty when unregistered.
    published: watch::Sender<String>,
    /// Username portion of the published name; suffix-only grants do not
    /// count as a username change.
    published_username: watch::Sender<String>,
}

/// Clonable handle to the shared local identity.
///
/// The hosting layer owns one of these for the process lifetime;
/// [`ServiceRecord`](crate::ServiceRecord) and
/// [`Browser`](crate::Browser) hold clones. Changes are announced on watch
/// channels rather than by callback wiring, so each consumer subscribes to
/// exactly the transitions it cares about.
#[derive(Clone)]
pub struct IdentityHandle {
    shared: Arc<IdentityShared>,
}

impl IdentityHandle {
    pub fn new(identity: LocalIdentity) -> Self {
        let (requested, _) = watch::channel(identity.requested_name());
        let (published, _) = watch::channel(String::new());
        let (published_username, _) = watch::channel(String::new());
        Self {
            shared: Arc::new(IdentityShared {
                state: Mutex::new(identity),
                requested,
                published,
                published_username,
            }),
        }
    }

    pub fn username(&self) -> String {
        self.shared.state.lock().unwrap().username.clone()
    }

    pub fn suffix(&self) -> String {
        self.shared.state.lock().unwrap().suffix.clone()
    }

    pub fn port(&self) -> u16 {
        self.shared.state.lock().unwrap().port
    }

    pub fn requested_name(&self) -> String {
        self.shared.state.lock().unwrap().requested_name()
    }

    pub fn published_name(&self) -> String {
        self.shared.state.lock().unwrap().published_name.clone()
    }

    /// Change the username. No-op if unchanged. Returns whether the
    /// requested name changed (and was announced on the requested-name
    /// channel).
    pub fn set_username(&self, username: &str) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if state.username == username {
            return false;
        }
        state.username = username.to_owned();
        let requested = state.requested_name();
        drop(state);
        debug!(requested = %requested, "requested name changed");
        self.shared.requested.send_replace(requested);
        true
    }

    /// Store the name the provider granted. Announces the published-name
    /// transition, and separately announces a username change when the
    /// username portion of the granted name differs from the previous one.
    pub fn set_published_name(&self, granted: impl Into<String>) {
        let granted = granted.into();
        let mut state = self.shared.state.lock().unwrap();
        if state.published_name == granted {
            return;
        }
        let previous = std::mem::replace(&mut state.published_name, granted.clone());
        drop(state);
        self.shared.published.send_replace(granted.clone());
        if username_of(&previous) != username_of(&granted) {
            self.shared
                .published_username
                .send_replace(username_of(&granted).to_owned());
        }
    }

    /// Clear the published name back to empty (record withdrawn).
    pub fn clear_published_name(&self) {
        self.set_published_name(String::new());
    }

    pub fn watch_requested(&self) -> watch::Receiver<String> {
        self.shared.requested.subscribe()
    }

    pub fn watch_published(&self) -> watch::Receiver<String> {
        self.shared.published.subscribe()
    }

    pub fn watch_published_username(&self) -> watch::Receiver<String> {
        self.shared.published_username.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn service_name_round_trip() {
        for (user, suffix) in [("alice", "host1"), ("bob", "x"), ("a@b", "c")] {
            let name = service_name_of(user, suffix);
            assert_eq!(username_of(&name), user);
        }
    }

    #[test]
    fn username_of_passthrough_without_at() {
        assert_eq!(username_of("legacy-peer"), "legacy-peer");
        assert_eq!(username_of(""), "");
    }

    #[test]
    fn username_of_strips_last_segment_only() {
        assert_eq!(username_of("a@b@c"), "a@b");
    }

    #[test]
    fn requested_name_derives_from_username_and_suffix() {
        let identity = LocalIdentity::new("alice", "host1", 5000);
        assert_eq!(identity.requested_name(), "alice@host1");
        assert_eq!(identity.published_name(), "");
    }

    #[test]
    fn set_username_noop_when_unchanged() {
        let handle = IdentityHandle::new(LocalIdentity::new("alice", "host1", 5000));
        let mut requested = handle.watch_requested();
        requested.mark_unchanged();

        assert!(!handle.set_username("alice"));
        assert!(!requested.has_changed().unwrap());

        assert!(handle.set_username("alice2"));
        assert!(requested.has_changed().unwrap());
        assert_eq!(*requested.borrow_and_update(), "alice2@host1");
    }

    #[test]
    fn published_name_signals_username_portion_separately() {
        let handle = IdentityHandle::new(LocalIdentity::new("alice", "host1", 5000));
        let mut published = handle.watch_published();
        let mut published_username = handle.watch_published_username();
        published.mark_unchanged();
        published_username.mark_unchanged();

        handle.set_published_name("alice@host1");
        assert!(published.has_changed().unwrap());
        assert!(published_username.has_changed().unwrap());
        published.mark_unchanged();
        published_username.mark_unchanged();

        // Suffix-only disambiguation by the provider: published name changes,
        // username portion does not.
        handle.set_published_name("alice@host1-2");
        assert!(published.has_changed().unwrap());
        assert!(!published_username.has_changed().unwrap());
    }

    #[test]
    fn clear_resets_published_name() {
        let handle = IdentityHandle::new(LocalIdentity::new("alice", "host1", 5000));
        handle.set_published_name("alice@host1");
        handle.clear_published_name();
        assert_eq!(handle.published_name(), "");
    }

    #[test]
    fn suffix_prefers_host_name() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            suffix_or_token(Some("host1".to_owned()), &mut rng),
            "host1"
        );
    }

    #[test]
    fn missing_host_name_falls_back_to_numeric_token() {
        let mut rng = StdRng::seed_from_u64(7);
        for host in [None, Some(String::new())] {
            let token = suffix_or_token(host, &mut rng);
            assert!(!token.is_empty());
            assert!(token.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
