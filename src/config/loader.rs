// Configuration loader
// Loads settings from ~/.syncbar/config.toml, then applies environment overrides

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::settings::Config;
use crate::errors;

/// Location of the user configuration file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".syncbar").join("config.toml"))
}

/// Load configuration from the default location or environment
///
/// A missing file is not an error: defaults are used.
pub fn load_config() -> Result<Config> {
    let mut config = match default_config_path() {
        Some(path) if path.exists() => read_config_file(&path)?,
        _ => Config::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load configuration from an explicit path (must exist)
pub fn load_config_from(path: &Path) -> Result<Config> {
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!(errors::config_parse_error(&e.to_string())))
        .with_context(|| format!("Invalid config file {}", path.display()))?;

    tracing::debug!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}

/// Override file values with SYNCBAR_* environment variables
pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

fn apply_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("SYNCBAR_URL").filter(|v| !v.is_empty()) {
        config.url = url;
    }
    if let Some(user) = lookup("SYNCBAR_USER") {
        config.username = user;
    }
    if let Some(password) = lookup("SYNCBAR_PASSWORD") {
        config.password = password;
    }
    if let Some(exe) = lookup("SYNCBAR_EXECUTABLE").filter(|v| !v.is_empty()) {
        config.daemon.executable = Some(PathBuf::from(exe));
    }
}
