//! Config loading and identity suffix derivation.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::config::Config;
use crate::error::DaemonError;

/// Load configuration from the given path, or the default location.
pub fn load_config(path: Option<&str>) -> Result<Config, DaemonError> {
    let config_path = match path {
        Some(p) => PathBuf::from(p),
        None => default_config_path(),
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| DaemonError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Derive the process-lifetime identity suffix: the host name, or a random
/// numeric token from a time-seeded generator when no host name exists.
pub fn derive_suffix() -> String {
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let mut rng = StdRng::seed_from_u64(seed);
    filedrop_discovery::identity::default_suffix(&mut rng)
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("filedrop")
}

/// Get the default config file path.
fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
