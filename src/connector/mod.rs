// Connector facade
//
// `SyncConnector` is what the desktop front-end holds: it owns the
// endpoint, one network client per flow, the health poller and the daemon
// process supervisor. Nothing in here is shared outside the instance.

pub mod health;
pub mod verifier;

pub use health::{
    ConnectionHealthCallback, HealthPoller, HealthResult, LinkState, DEFAULT_HEALTH_INTERVAL,
    MIN_HEALTH_INTERVAL,
};
pub use verifier::{
    parse_version, ConnectionStateCallback, ConnectionVerifier, VersionCheckResult,
};

use reqwest::Url;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::client::{DaemonClient, Endpoint, Probe, SharedEndpoint};
use crate::config::Config;
use crate::daemon::{ProcessSpawnedCallback, ProcessState, ProcessSupervisor};
use crate::errors::ConnectorError;
use crate::tls::TlsPolicy;

/// Supervisory connection to one sync daemon
pub struct SyncConnector {
    endpoint: SharedEndpoint,
    version_client: Arc<dyn Probe>,
    health_client: Arc<dyn Probe>,
    verifier: ConnectionVerifier,
    poller: HealthPoller,
    supervisor: ProcessSupervisor,
}

impl SyncConnector {
    /// Build a connector from configuration
    ///
    /// The configured credentials are embedded into the endpoint right away;
    /// no request is sent until `set_url`, `check_connection` or the health
    /// poller asks for one.
    pub fn new(config: &Config) -> Result<Self, ConnectorError> {
        let mut endpoint = Endpoint::parse(&config.url)?;
        endpoint.configure(endpoint.current().clone(), &config.username, &config.password)?;

        let probe_policy = if config.trust_any_certificate_on_probe {
            TlsPolicy::AcceptAny
        } else {
            TlsPolicy::LocalDaemon
        };
        let version_client: Arc<dyn Probe> =
            Arc::new(DaemonClient::new(probe_policy, config.request_timeout())?);
        let health_client: Arc<dyn Probe> =
            Arc::new(DaemonClient::new(TlsPolicy::LocalDaemon, config.request_timeout())?);

        let endpoint = SharedEndpoint::new(endpoint);
        Ok(Self {
            verifier: ConnectionVerifier::new(version_client.clone(), endpoint.clone()),
            poller: HealthPoller::new(health_client.clone(), endpoint.clone())
                .with_interval(config.health_interval()),
            supervisor: ProcessSupervisor::new().with_log_file(config.daemon.log_file.clone()),
            endpoint,
            version_client,
            health_client,
        })
    }

    /// Build a connector around caller-supplied probes
    pub fn with_probes(
        endpoint: Endpoint,
        version_client: Arc<dyn Probe>,
        health_client: Arc<dyn Probe>,
    ) -> Self {
        let endpoint = SharedEndpoint::new(endpoint);
        Self {
            verifier: ConnectionVerifier::new(version_client.clone(), endpoint.clone()),
            poller: HealthPoller::new(health_client.clone(), endpoint.clone()),
            supervisor: ProcessSupervisor::new(),
            endpoint,
            version_client,
            health_client,
        }
    }

    /// Replace the health poll interval (takes effect on the next start)
    ///
    /// Intervals below `MIN_HEALTH_INTERVAL` are raised to it.
    pub fn with_health_interval(mut self, interval: std::time::Duration) -> Self {
        self.poller.stop();
        self.poller = HealthPoller::new(self.health_client.clone(), self.endpoint.clone())
            .with_interval(interval);
        self
    }

    /// Point the connector at a daemon and verify the connection once
    ///
    /// Credentials are embedded into `url`, cached connections of both
    /// clients are dropped, then one version request is sent; `callback`
    /// receives `(version, true)` or `(error message, false)`. Must be
    /// called within a Tokio runtime.
    pub fn set_url<F>(
        &mut self,
        url: Url,
        username: &str,
        password: &str,
        callback: F,
    ) -> Result<JoinHandle<()>, ConnectorError>
    where
        F: FnOnce(String, bool) + Send + 'static,
    {
        self.endpoint.configure(url, username, password)?;
        self.version_client.reset();
        self.health_client.reset();
        info!(url = %self.endpoint.snapshot().redacted(), "Daemon endpoint changed");

        Ok(self.verifier.verify(callback))
    }

    /// Verify the current endpoint and return the result directly
    pub async fn check_connection(&self) -> VersionCheckResult {
        self.verifier.check().await
    }

    /// Register the health callback and (re)start polling
    ///
    /// Must be called within a Tokio runtime.
    pub fn set_connection_health_callback(&mut self, callback: ConnectionHealthCallback) {
        self.poller.start(callback);
    }

    pub fn stop_health_checks(&mut self) {
        self.poller.stop();
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_polling()
    }

    /// Register the process callback, replacing any previous one
    pub fn set_process_spawned_callback(&self, callback: ProcessSpawnedCallback) {
        self.supervisor.set_process_state_callback(callback);
    }

    /// Launch the daemon executable
    pub fn spawn_daemon(&mut self, executable: impl AsRef<Path>) -> Result<(), ConnectorError> {
        self.supervisor.spawn(executable)
    }

    pub fn daemon_state(&self) -> ProcessState {
        self.supervisor.state()
    }

    pub fn daemon_pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    /// Credentialed URL of the daemon GUI
    pub fn current_url(&self) -> Url {
        self.endpoint.snapshot().current().clone()
    }

    pub fn endpoint(&self) -> &SharedEndpoint {
        &self.endpoint
    }
}

impl Drop for SyncConnector {
    fn drop(&mut self) {
        self.poller.stop();
        self.supervisor.shutdown();
    }
}
