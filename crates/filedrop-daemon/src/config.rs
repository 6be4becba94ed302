//! Daemon configuration loaded from TOML.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// The name this instance announces itself under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_username")]
    pub username: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
        }
    }
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP port the transfer listener binds; announced via discovery.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Incoming-transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    /// Accept incoming files without asking.
    #[serde(default)]
    pub always_accept: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            always_accept: false,
        }
    }
}

fn default_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "filedrop".to_owned())
}

fn default_port() -> u16 {
    52100
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}
