//! Status fan-out: probe many machines concurrently, each under a deadline.
//!
//! Every loaded machine gets its own probe task. The orchestrator races each
//! probe against a fixed timeout; a probe that loses the race is reported as
//! [`State::Timeout`] and its eventual result, if any, is dropped. The
//! probe's own backend calls are not cancelled. Machines that failed to load
//! at all are appended afterwards as [`State::Error`].
//!
//! ```text
//!  hosts ──┬─> probe(a) ──oneshot──> race(timeout) ──┐
//!          ├─> probe(b) ──oneshot──> race(timeout) ──┼─mpsc─> items (arrival order)
//!          └─> probe(c) ──oneshot──> race(timeout) ──┘           + load errors
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::backend::{
    EngineClient, EngineOptions, HOST_NOT_RUNNING, Host, State, SwarmOptions,
};

/// Default per-probe deadline.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Version reported when the engine cannot be asked.
pub const UNKNOWN_VERSION: &str = "Unknown";

/// Driver name reported for machines that failed to load.
pub const DRIVER_NOT_FOUND: &str = "not found";

/// One row of the machine listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostListItem {
    /// Machine name.
    pub name: String,
    /// `-`, `*`, or `* (swarm)`.
    pub active: String,
    /// Whether this machine is the selected engine.
    pub active_host: bool,
    /// Whether this machine's swarm master is the selected engine.
    pub active_swarm: bool,
    /// Driver name.
    pub driver_name: String,
    /// Derived state.
    pub state: State,
    /// Engine URL, empty unless reachable.
    #[serde(rename = "URL")]
    pub url: String,
    /// Swarm options, when recorded.
    pub swarm_options: Option<SwarmOptions>,
    /// Engine options, when recorded.
    pub engine_options: Option<EngineOptions>,
    /// Engine version, `v<version>` or `Unknown`.
    pub docker_version: String,
    /// Error text, empty when healthy.
    pub error: String,
}

/// Knobs for one fan-out.
#[derive(Clone)]
pub struct StatusSettings {
    /// Per-probe deadline.
    pub timeout: Duration,
    /// The currently selected engine URL (`DOCKER_HOST`), if any.
    pub active_host: Option<String>,
    /// Client for the best-effort version query.
    pub engine: Arc<dyn EngineClient>,
}

impl std::fmt::Debug for StatusSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusSettings")
            .field("timeout", &self.timeout)
            .field("active_host", &self.active_host)
            .finish_non_exhaustive()
    }
}

/// Probe every host concurrently and merge in the hosts that failed to load.
///
/// Loaded hosts appear in the order their probes finished (or timed out),
/// followed by `load_errors` in map order.
pub async fn list_hosts(
    hosts: Vec<Host>,
    load_errors: &BTreeMap<String, String>,
    settings: &StatusSettings,
) -> Vec<HostListItem> {
    let expected = hosts.len();
    let (item_tx, mut item_rx) = mpsc::channel(expected.max(1));

    for host in hosts {
        let item_tx = item_tx.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            let item = probe_with_deadline(host, settings).await;
            // The receiver outlives every sender; a failed send means the
            // listing was abandoned.
            let _ = item_tx.send(item).await;
        });
    }
    drop(item_tx);

    let mut items = Vec::with_capacity(expected + load_errors.len());
    while let Some(item) = item_rx.recv().await {
        items.push(item);
    }

    items.extend(load_errors.iter().map(|(name, error)| HostListItem {
        name: name.clone(),
        active: "-".to_string(),
        driver_name: DRIVER_NOT_FOUND.to_string(),
        state: State::Error,
        error: error.clone(),
        ..HostListItem::default()
    }));
    items
}

async fn probe_with_deadline(host: Host, settings: StatusSettings) -> HostListItem {
    let name = host.name.clone();
    let driver_name = host.driver_name().to_string();
    let timeout = settings.timeout;

    let (probe_tx, probe_rx) = oneshot::channel();
    tokio::spawn(async move {
        let item = probe(&host, &settings).await;
        // Dropped when the deadline already won.
        let _ = probe_tx.send(item);
    });

    match tokio::time::timeout(timeout, probe_rx).await {
        Ok(Ok(item)) => item,
        Ok(Err(_)) => {
            warn!(machine = %name, "status probe aborted");
            HostListItem {
                name,
                active: "-".to_string(),
                driver_name,
                state: State::Error,
                error: "status probe aborted".to_string(),
                ..HostListItem::default()
            }
        }
        Err(_) => {
            debug!(machine = %name, ?timeout, "status probe timed out");
            HostListItem {
                name,
                active: "-".to_string(),
                driver_name,
                state: State::Timeout,
                ..HostListItem::default()
            }
        }
    }
}

/// Derive one host's listing row, calling the driver as little as possible.
async fn probe(host: &Host, settings: &StatusSettings) -> HostListItem {
    let mut url = String::new();
    let mut error = None;

    let state = match host.url().await {
        // A reachable URL means the machine is running; skip the state query.
        Ok(found) if !found.is_empty() => {
            url = found;
            State::Running
        }
        Ok(_) => match host.state().await {
            Ok(state) => state,
            Err(e) => {
                error = Some(e.to_string());
                State::None
            }
        },
        Err(e) => {
            error = Some(e.to_string());
            host.state().await.unwrap_or_default()
        }
    };

    let docker_version = if url.is_empty() {
        UNKNOWN_VERSION.to_string()
    } else {
        match settings.engine.version(&url).await {
            Ok(version) => format!("v{version}"),
            Err(e) => {
                debug!(machine = %host.name, error = %e, "engine version unavailable");
                UNKNOWN_VERSION.to_string()
            }
        }
    };

    let error = error
        .filter(|text| text != HOST_NOT_RUNNING)
        .unwrap_or_default();

    let (swarm_options, engine_options) = match &host.options {
        Some(options) => (
            Some(options.swarm_options.clone()),
            Some(options.engine_options.clone()),
        ),
        None => (None, None),
    };
    let (is_master, swarm_host) = swarm_options
        .as_ref()
        .map(|swarm| (swarm.master, swarm.host.as_str()))
        .unwrap_or((false, ""));

    let selected = settings.active_host.as_deref();
    let active_host = is_active(state, &url, selected);
    let active_swarm = is_swarm_active(state, &url, is_master, swarm_host, selected);
    let active = if active_swarm {
        "* (swarm)"
    } else if active_host {
        "*"
    } else {
        "-"
    };

    HostListItem {
        name: host.name.clone(),
        active: active.to_string(),
        active_host,
        active_swarm,
        driver_name: host.driver_name().to_string(),
        state,
        url,
        swarm_options,
        engine_options,
        docker_version,
        error,
    }
}

/// Whether a host is the selected engine.
pub fn is_active(state: State, url: &str, selected: Option<&str>) -> bool {
    state == State::Running && selected == Some(url)
}

/// Whether a host's swarm master endpoint is the selected engine.
pub fn is_swarm_active(
    state: State,
    url: &str,
    is_master: bool,
    swarm_host: &str,
    selected: Option<&str>,
) -> bool {
    is_master && state == State::Running && selected == Some(to_swarm_url(url, swarm_host).as_str())
}

fn url_port(url: &str) -> &str {
    url.rsplit(':').next().unwrap_or(url)
}

/// Replace the port of `host_url` with the port of `swarm_host`.
///
/// `tcp://1.2.3.4:2376` with swarm host `tcp://0.0.0.0:3376` becomes
/// `tcp://1.2.3.4:3376`.
pub fn to_swarm_url(host_url: &str, swarm_host: &str) -> String {
    let host_port = url_port(host_url);
    let swarm_port = url_port(swarm_host);
    host_url.replacen(&format!(":{host_port}"), &format!(":{swarm_port}"), 1)
}
