//! Best-effort queries against a machine's Docker engine.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::MachineError;

/// Asks a running engine for its version.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Engine version reachable at `url`, without a leading `v`.
    async fn version(&self, url: &str) -> Result<String, MachineError>;
}

#[derive(Deserialize)]
struct VersionResponse {
    #[serde(rename = "Version")]
    version: String,
}

/// [`EngineClient`] speaking plain HTTP to the engine's `/version` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEngineClient {
    client: reqwest::Client,
}

impl HttpEngineClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, MachineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MachineError::Driver(format!("failed to build engine client: {e}")))?;
        Ok(Self { client })
    }
}

/// Rewrite a `tcp://` engine URL into an HTTP base URL.
pub(crate) fn http_base(url: &str) -> String {
    match url.strip_prefix("tcp://") {
        Some(rest) => format!("http://{}", rest.trim_end_matches('/')),
        None => url.trim_end_matches('/').to_string(),
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn version(&self, url: &str) -> Result<String, MachineError> {
        let endpoint = format!("{}/version", http_base(url));
        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| MachineError::Driver(e.to_string()))?;
        let body: VersionResponse = response
            .json()
            .await
            .map_err(|e| MachineError::Driver(e.to_string()))?;
        Ok(body.version)
    }
}
