//! Daemon-level integration: identity lifecycle plus peer discovery against
//! scripted collaborators.

use std::sync::Arc;
use std::time::Duration;

use filedrop_daemon::config::Config;
use filedrop_daemon::{Daemon, DaemonCommand, DaemonStatus};
use filedrop_discovery::mock::{MockLookup, MockProvider};
use filedrop_discovery::PeerEvent;
use tokio::sync::{mpsc, watch};

struct TestDaemon {
    provider: MockProvider,
    lookup: MockLookup,
    commands: mpsc::Sender<DaemonCommand>,
    status: watch::Receiver<DaemonStatus>,
    peers: mpsc::Receiver<PeerEvent>,
    handle: tokio::task::JoinHandle<()>,
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.identity.username = "alice".to_owned();
    config.network.port = 5000;
    config
}

async fn setup() -> TestDaemon {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();

    let provider = MockProvider::new();
    let lookup = MockLookup::new();
    let (mut daemon, peers) = Daemon::new(
        &test_config(),
        "host1".to_owned(),
        Arc::new(provider.clone()),
        Arc::new(lookup.clone()),
    );
    let commands = daemon.command_sender();
    let status = daemon.status_receiver();

    let handle = tokio::spawn(async move {
        if let Err(e) = daemon.run().await {
            eprintln!("daemon error: {e}");
        }
    });

    TestDaemon {
        provider,
        lookup,
        commands,
        status,
        peers,
        handle,
    }
}

/// Wait for a condition on the status watch with timeout.
async fn wait_for_status(
    rx: &mut watch::Receiver<DaemonStatus>,
    pred: impl Fn(&DaemonStatus) -> bool,
) -> DaemonStatus {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let status = rx.borrow_and_update().clone();
                if pred(&status) {
                    return status;
                }
            }
            rx.changed().await.expect("status watch closed");
        }
    })
    .await
    .expect("timed out waiting for status")
}

impl TestDaemon {
    async fn shutdown(self) {
        let _ = self.commands.send(DaemonCommand::Shutdown).await;
        let _ = tokio::time::timeout(Duration::from_secs(2), self.handle).await;
    }
}

#[tokio::test]
async fn registration_flows_into_status() {
    let mut daemon = setup().await;

    let status = wait_for_status(&mut daemon.status, |s| !s.published_name.is_empty()).await;
    assert_eq!(status.published_name, "alice@host1");
    assert_eq!(status.username, "alice");

    daemon.shutdown().await;
}

#[tokio::test]
async fn rename_republishes_under_new_name() {
    let mut daemon = setup().await;
    wait_for_status(&mut daemon.status, |s| s.published_name == "alice@host1").await;

    daemon
        .commands
        .send(DaemonCommand::SetUsername("alice2".to_owned()))
        .await
        .unwrap();

    let status = wait_for_status(&mut daemon.status, |s| s.published_name == "alice2@host1").await;
    assert_eq!(status.username, "alice2");

    // The old record was withdrawn and a fresh registration was issued.
    tokio::time::timeout(Duration::from_secs(2), async {
        while daemon.provider.unregistrations().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("old record should be withdrawn");
    assert_eq!(daemon.provider.unregistrations(), vec!["alice@host1"]);
    let desired: Vec<String> = daemon
        .provider
        .registrations()
        .iter()
        .map(|r| r.desired_name.clone())
        .collect();
    assert_eq!(desired, vec!["alice@host1", "alice2@host1"]);

    daemon.shutdown().await;
}

#[tokio::test]
async fn registration_conflict_keeps_published_name_empty() {
    let provider = MockProvider::new();
    provider.fail_register(
        "alice@host1",
        filedrop_discovery::ProviderError::NameConflict,
    );
    let lookup = MockLookup::new();
    let (mut daemon, _peers) = Daemon::new(
        &test_config(),
        "host1".to_owned(),
        Arc::new(provider.clone()),
        Arc::new(lookup),
    );
    let commands = daemon.command_sender();
    let mut status = daemon.status_receiver();
    let handle = tokio::spawn(async move {
        let _ = daemon.run().await;
    });

    // The registration attempt must have been made and failed; the instance
    // keeps running, invisible to others.
    tokio::time::timeout(Duration::from_secs(2), async {
        while provider.registrations().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registration should be attempted");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(status.borrow_and_update().published_name, "");

    let _ = commands.send(DaemonCommand::Shutdown).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
}

#[tokio::test]
async fn shutdown_withdraws_record_before_returning() {
    let mut daemon = setup().await;
    wait_for_status(&mut daemon.status, |s| !s.published_name.is_empty()).await;

    daemon.commands.send(DaemonCommand::Shutdown).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), daemon.handle)
        .await
        .expect("daemon should stop")
        .expect("daemon task should not panic");

    // No grace period: the run loop awaits the withdrawal before returning.
    assert_eq!(daemon.provider.unregistrations(), vec!["alice@host1"]);
}

#[tokio::test]
async fn discovered_peers_reach_the_application() {
    let mut daemon = setup().await;
    wait_for_status(&mut daemon.status, |s| !s.published_name.is_empty()).await;

    daemon.provider.set_resolved("bob@host2", "host2.local", 5000);
    daemon
        .lookup
        .insert("host2.local", vec!["192.168.1.42".parse().unwrap()]);
    daemon.provider.add_peer("bob@host2").await;

    let event = tokio::time::timeout(Duration::from_secs(2), daemon.peers.recv())
        .await
        .expect("timed out waiting for peer event")
        .expect("peer channel closed");
    match event {
        PeerEvent::Added(peer) => {
            assert_eq!(peer.username, "bob");
            assert_eq!(peer.hostname, "host2.local");
            assert_eq!(peer.port, 5000);
        }
        other => panic!("expected added, got {other:?}"),
    }

    let status = wait_for_status(&mut daemon.status, |s| s.peer_count == 1).await;
    assert_eq!(status.peer_count, 1);

    daemon.provider.remove_peer("bob@host2").await;
    wait_for_status(&mut daemon.status, |s| s.peer_count == 0).await;

    daemon.shutdown().await;
}
