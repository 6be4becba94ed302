//! filedrop CLI — user-facing binary for the filedrop LAN file-sharing daemon.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use filedrop_daemon::{setup, Daemon, DaemonCommand};
use filedrop_discovery::{DnsLookup, MdnsProvider, PeerEvent};

#[derive(Parser)]
#[command(
    name = "filedrop",
    about = "Share files with peers on the local network",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the filedrop daemon in the foreground.
    Run {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,

        /// Override the username announced on the network.
        #[arg(short, long)]
        name: Option<String>,

        /// Override the transfer port announced on the network.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the effective configuration and its source path.
    Config {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, name, port } => {
            let mut config = setup::load_config(config.as_deref())?;
            if let Some(name) = name {
                config.identity.username = name;
            }
            if let Some(port) = port {
                config.network.port = port;
            }
            run_daemon(config).await?;
        }
        Commands::Config { config } => {
            let loaded = setup::load_config(config.as_deref())?;
            println!("# {}", setup::config_dir().join("config.toml").display());
            print!("{}", toml::to_string_pretty(&loaded)?);
        }
    }

    Ok(())
}

async fn run_daemon(config: filedrop_daemon::Config) -> anyhow::Result<()> {
    let suffix = setup::derive_suffix();
    tracing::info!(username = %config.identity.username, suffix = %suffix, "starting filedrop");

    let provider = Arc::new(MdnsProvider::new()?);
    let (mut daemon, mut peers) = Daemon::new(&config, suffix, provider, Arc::new(DnsLookup));
    let commands = daemon.command_sender();

    let printer = tokio::spawn(async move {
        while let Some(event) = peers.recv().await {
            match event {
                PeerEvent::Added(peer) => {
                    println!("+ {} ({} port {})", peer.service_name, peer.address, peer.port);
                }
                PeerEvent::Updated(peer) => {
                    println!("~ {} ({} port {})", peer.service_name, peer.address, peer.port);
                }
                PeerEvent::Removed(service_name) => {
                    println!("- {service_name}");
                }
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, shutting down");
            let _ = commands.send(DaemonCommand::Shutdown).await;
        }
    });

    daemon.run().await?;
    printer.abort();
    Ok(())
}
