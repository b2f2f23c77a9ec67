// Daemon client implementation
//
// reqwest-backed `Probe` talking to the sync daemon's REST API with the
// certificate policy from `crate::tls`.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::error::Error as _;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

use super::endpoint::redact;
use super::probe::{Probe, ProbeOutcome};
use crate::errors::ConnectorError;
use crate::tls::{build_tls_config, TlsPolicy};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for one connector flow (version check or health check)
pub struct DaemonClient {
    client: RwLock<Client>,
    policy: TlsPolicy,
    timeout: Duration,
}

impl DaemonClient {
    /// Create a client with the given certificate policy and request timeout
    pub fn new(policy: TlsPolicy, timeout: Duration) -> Result<Self, ConnectorError> {
        Ok(Self {
            client: RwLock::new(build_client(policy, timeout)?),
            policy,
            timeout,
        })
    }

    /// Create a client with the local-daemon policy and default timeout
    pub fn with_defaults() -> Result<Self, ConnectorError> {
        Self::new(TlsPolicy::LocalDaemon, DEFAULT_TIMEOUT)
    }

    pub fn policy(&self) -> TlsPolicy {
        self.policy
    }

    fn current(&self) -> Client {
        self.client.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

fn build_client(policy: TlsPolicy, timeout: Duration) -> Result<Client, ConnectorError> {
    let tls = build_tls_config(policy)?;
    let client = Client::builder()
        .use_preconfigured_tls(tls)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Render a reqwest error and its sources as one line, without the URL
fn describe(err: reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection"
    } else if err.is_decode() || err.is_body() {
        "body"
    } else {
        "request"
    };
    debug!(kind, "Probe transport error");

    let err = err.without_url();
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[async_trait]
impl Probe for DaemonClient {
    async fn get(&self, url: Url) -> ProbeOutcome {
        let shown = redact(&url);
        debug!(url = %shown, "Sending probe");

        let response = self.current().get(url).send().await.map_err(describe)?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %shown, status = %status, "Probe rejected");
            return Err(format!("HTTP status {}", status));
        }

        response.text().await.map_err(describe)
    }

    fn reset(&self) {
        match build_client(self.policy, self.timeout) {
            Ok(client) => {
                *self.client.write().unwrap_or_else(|e| e.into_inner()) = client;
                debug!("HTTP client reset, pooled connections dropped");
            }
            Err(e) => warn!(error = %e, "Failed to rebuild HTTP client, keeping previous one"),
        }
    }
}
