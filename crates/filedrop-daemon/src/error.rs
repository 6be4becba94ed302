//! Daemon errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("discovery error: {0}")]
    Discovery(#[from] filedrop_discovery::DiscoveryError),

    #[error("provider error: {0}")]
    Provider(#[from] filedrop_discovery::ProviderError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
