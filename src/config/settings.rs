// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::connector::MIN_HEALTH_INTERVAL;

/// Default daemon GUI address
pub const DEFAULT_URL: &str = "https://127.0.0.1:8384";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Daemon base URL (scheme, host and port of its GUI/REST listener)
    pub url: String,

    /// GUI user; empty for anonymous access
    pub username: String,

    /// GUI password; empty for anonymous access
    pub password: String,

    /// Health poll interval in milliseconds (default: 3000)
    pub health_interval_ms: u64,

    /// Per-request timeout in seconds (default: 10)
    pub request_timeout_secs: u64,

    /// Accept any certificate on the one-shot version probe
    pub trust_any_certificate_on_probe: bool,

    /// Daemon process settings
    pub daemon: DaemonSettings,
}

/// Settings for the supervised daemon process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// Path to the daemon executable
    pub executable: Option<PathBuf>,

    /// Append the daemon's stdout/stderr to this file instead of discarding them
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            username: String::new(),
            password: String::new(),
            health_interval_ms: 3000,
            request_timeout_secs: 10,
            trust_any_certificate_on_probe: false,
            daemon: DaemonSettings::default(),
        }
    }
}

impl Config {
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms).max(MIN_HEALTH_INTERVAL)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
