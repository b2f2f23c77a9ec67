// Error types and user-friendly error messages
//
// `ConnectorError` covers the library's own failures (bad URLs, client
// construction, double spawn). Failures talking to the daemon are never
// raised through it: they are turned into callback values instead.

use std::fmt;
use thiserror::Error;

/// Errors returned by the connector's configuration and lifecycle operations
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Base URL could not be parsed or cannot carry credentials
    #[error("invalid daemon URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// TLS configuration could not be constructed
    #[error("failed to configure TLS: {0}")]
    Tls(String),

    /// A daemon child process is already being supervised
    #[error("daemon process already running (PID: {0})")]
    AlreadySpawned(u32),

    /// Configuration file is unreadable or malformed
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rustls::Error> for ConnectorError {
    fn from(err: rustls::Error) -> Self {
        ConnectorError::Tls(err.to_string())
    }
}

/// Format a connection refused error with helpful suggestions
pub fn connection_refused_error(address: &str) -> String {
    format!(
        "Could not connect to sync daemon at {}\n\n\
        \x1b[1;33mPossible causes:\x1b[0m\n\
        • Daemon is not running\n\
        • Daemon crashed or failed to start\n\
        • Wrong GUI address or port\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Start the daemon through syncbar:\n\
           \x1b[36msyncbar spawn /path/to/daemon\x1b[0m\n\n\
        2. Check the configured address:\n\
           \x1b[36mcat ~/.syncbar/config.toml\x1b[0m",
        address
    )
}

/// Format an authentication failure with helpful suggestions
pub fn authentication_failed_error(address: &str) -> String {
    format!(
        "Sync daemon at {} rejected the credentials\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Check the GUI user and password in the daemon settings\n\
        2. Pass them explicitly:\n\
           \x1b[36msyncbar check --user <name> --password <secret>\x1b[0m",
        address
    )
}

/// Format a config parse error with helpful suggestions
pub fn config_parse_error(error: &str) -> String {
    format!(
        "Failed to parse config file\n\n\
        \x1b[1;33mError:\x1b[0m {}\n\n\
        \x1b[1;32mTry:\x1b[0m\n\
        1. Check config file syntax:\n\
           \x1b[36mcat ~/.syncbar/config.toml\x1b[0m\n\n\
        2. Common mistakes:\n\
           • Missing quotes around strings\n\
           • Numbers written as strings (health_interval_ms = \"3000\")",
        error
    )
}

/// Wrap a generic error with suggestions
pub fn wrap_error_with_suggestion(error: impl fmt::Display, suggestion: &str) -> String {
    format!("{}\n\n\x1b[1;33mSuggestion:\x1b[0m {}", error, suggestion)
}

/// Pick a helpful rendering for a failed version check message
pub fn explain_probe_failure(address: &str, message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("401") || lower.contains("403") {
        authentication_failed_error(address)
    } else if lower.contains("connect") || lower.contains("refused") {
        connection_refused_error(address)
    } else {
        wrap_error_with_suggestion(message, "Check that the daemon GUI address is reachable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_refused_has_helpful_message() {
        let msg = connection_refused_error("127.0.0.1:8384");
        assert!(msg.contains("syncbar spawn"));
        assert!(msg.contains("config.toml"));
    }

    #[test]
    fn test_explain_probe_failure_detects_auth() {
        let msg = explain_probe_failure("localhost:8384", "HTTP status 401 Unauthorized");
        assert!(msg.contains("rejected the credentials"));
    }

    #[test]
    fn test_already_spawned_display() {
        let err = ConnectorError::AlreadySpawned(42);
        assert_eq!(err.to_string(), "daemon process already running (PID: 42)");
    }
}
