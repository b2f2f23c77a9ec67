// Periodic connection health polling against /rest/system/connections
//
// One timer task per poller. Each tick issues a probe; probes run
// concurrently inside the timer task so stopping the timer also aborts
// whatever is still in flight.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::{Probe, ProbeOutcome, SharedEndpoint, CONNECTIONS_PATH};

/// Interval between two health probes
pub const DEFAULT_HEALTH_INTERVAL: Duration = Duration::from_millis(3000);

/// Shortest accepted poll interval
pub const MIN_HEALTH_INTERVAL: Duration = Duration::from_millis(100);

/// Callback receiving every health result
pub type ConnectionHealthCallback = Arc<dyn Fn(HealthResult) + Send + Sync>;

/// Daemon reachability as reported under the `state` key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// "0": error, timeout or empty answer
    Unreachable,
    /// "1": the daemon answered with data
    Reachable,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Unreachable => "0",
            LinkState::Reachable => "1",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "0" => Some(LinkState::Unreachable),
            "1" => Some(LinkState::Reachable),
            _ => None,
        }
    }
}

/// Result of one health probe
///
/// `connections` is present only when the daemon was reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthResult {
    pub state: LinkState,
    pub connections: Option<usize>,
}

impl HealthResult {
    pub fn unreachable() -> Self {
        Self {
            state: LinkState::Unreachable,
            connections: None,
        }
    }

    pub fn reachable(connections: usize) -> Self {
        Self {
            state: LinkState::Reachable,
            connections: Some(connections),
        }
    }

    /// Build a result from a probe outcome
    ///
    /// Errors and empty bodies are unreachable. Any non-empty body is
    /// reachable; the count is the number of entries in its `connections`
    /// object, 0 if that cannot be read.
    pub fn from_outcome(outcome: &ProbeOutcome) -> Self {
        match outcome {
            Ok(body) if !body.is_empty() => Self::reachable(count_connections(body)),
            _ => Self::unreachable(),
        }
    }

    /// String mapping handed to the desktop front-end
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("state".to_string(), self.state.as_str().to_string());
        if let Some(count) = self.connections {
            map.insert("connections".to_string(), count.to_string());
        }
        map
    }

    /// Parse a mapping produced by `to_map`
    pub fn from_map(map: &BTreeMap<String, String>) -> Option<Self> {
        let state = LinkState::parse(map.get("state")?)?;
        let connections = match map.get("connections") {
            Some(count) => Some(count.parse().ok()?),
            None => None,
        };
        Some(Self { state, connections })
    }
}

fn count_connections(body: &str) -> usize {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|doc| doc.get("connections").and_then(Value::as_object).map(|c| c.len()))
        .unwrap_or(0)
}

/// Timer-driven health checker
///
/// At most one timer is active: `start` replaces both the running timer and
/// the callback.
pub struct HealthPoller {
    probe: Arc<dyn Probe>,
    endpoint: SharedEndpoint,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl HealthPoller {
    pub fn new(probe: Arc<dyn Probe>, endpoint: SharedEndpoint) -> Self {
        Self {
            probe,
            endpoint,
            interval: DEFAULT_HEALTH_INTERVAL,
            task: None,
        }
    }

    /// Set the poll interval, raised to `MIN_HEALTH_INTERVAL` if shorter
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_HEALTH_INTERVAL);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling, reporting each result through `callback`
    ///
    /// A poller that is already running is stopped first; results of probes
    /// issued under the previous callback are discarded. The first probe is
    /// sent one interval after this call. Must be called within a Tokio
    /// runtime.
    pub fn start(&mut self, callback: ConnectionHealthCallback) {
        self.stop();

        let probe = self.probe.clone();
        let endpoint = self.endpoint.clone();
        let interval = self.interval;
        info!(interval_ms = interval.as_millis() as u64, "Starting health polling");

        self.task = Some(tokio::spawn(run_poll_loop(probe, endpoint, interval, callback)));
    }

    /// Stop the timer and abort in-flight probes
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Health polling stopped");
        }
    }

    pub fn is_polling(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for HealthPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_poll_loop(
    probe: Arc<dyn Probe>,
    endpoint: SharedEndpoint,
    interval: Duration,
    callback: ConnectionHealthCallback,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut in_flight: JoinSet<(u64, HealthResult)> = JoinSet::new();
    let mut next_token: u64 = 0;
    let mut last_delivered: Option<u64> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let token = next_token;
                next_token += 1;
                let url = endpoint.derive(CONNECTIONS_PATH);
                let probe = probe.clone();
                in_flight.spawn(async move {
                    let outcome = probe.get(url).await;
                    if let Err(message) = &outcome {
                        debug!(token, error = %message, "Health probe failed");
                    }
                    (token, HealthResult::from_outcome(&outcome))
                });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Ok((token, result)) => {
                        // A newer probe already reported: this one is stale
                        if last_delivered.is_some_and(|last| token < last) {
                            debug!(token, "Dropping superseded health result");
                            continue;
                        }
                        last_delivered = Some(token);
                        callback(result);
                    }
                    Err(e) => warn!(error = %e, "Health probe task failed"),
                }
            }
        }
    }
}
