use crate::config::ProvisionConfig;
use crate::error::{ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// `~/.devspace/config.yaml`, or `None` when no home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".devspace").join("config.yaml"))
}

/// Load, apply environment overrides, and validate a config file.
#[instrument(fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<ProvisionConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    // An empty file means "all defaults"
    let mut config: ProvisionConfig = if raw.trim().is_empty() {
        ProvisionConfig::default()
    } else {
        serde_yaml_ng::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };

    config.apply_env_overrides();
    config.validate()?;
    debug!(?config, "Loaded provisioning config");
    Ok(config)
}

/// Load an explicit path, else the default path when it exists, else defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<ProvisionConfig> {
    if let Some(path) = path {
        return load(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => load(&path),
        _ => {
            let config = ProvisionConfig::from_env();
            config.validate()?;
            Ok(config)
        }
    }
}
