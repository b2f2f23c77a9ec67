// HTTP client for daemon communication
//
// Provides the credentialed endpoint, the probe seam used by the
// connection verifier and health poller, and the reqwest-backed client.

pub mod endpoint;
mod daemon_client;
mod probe;

pub use daemon_client::DaemonClient;
pub use endpoint::{Credentials, Endpoint, SharedEndpoint, CONNECTIONS_PATH, VERSION_PATH};
pub use probe::{Probe, ProbeOutcome};
