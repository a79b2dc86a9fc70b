//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::InstanceConfig;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load an instance configuration from a TOML file.
///
/// Only syntax is checked here; semantic checks need the API registry and
/// live in [`crate::config::validation`].
pub fn load_config(path: &Path) -> Result<InstanceConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse an instance configuration from TOML text.
pub fn parse_config(content: &str) -> Result<InstanceConfig, ConfigError> {
    let config: InstanceConfig = toml::from_str(content)?;

    tracing::debug!(servers = config.servers.len(), "Configuration parsed");
    Ok(config)
}
