// Probe seam: one asynchronous GET against the daemon REST API

use async_trait::async_trait;
use reqwest::Url;

/// Body of a successful response, or a human-readable failure message
///
/// Transport failures, TLS rejections and non-2xx statuses all end up as
/// `Err`; nothing is raised past the probe.
pub type ProbeOutcome = Result<String, String>;

/// Issues single GET requests for the connector
///
/// Each connector flow owns its own probe instance; there is no shared
/// client state between them.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Fetch `url` (credentials are taken from its user-info)
    async fn get(&self, url: Url) -> ProbeOutcome;

    /// Drop cached connections and session state
    fn reset(&self) {}
}
