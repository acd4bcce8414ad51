use crate::types::ProgressResponse;
use async_trait::async_trait;
use scoutline_core::{ScoutlineError, ScoutlineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Query side of the external progress service.
#[async_trait]
pub trait ProgressClient: Send + Sync {
    /// Progress for `session_id`, or for whatever is active when `None`.
    async fn query_progress(&self, session_id: Option<&str>) -> ScoutlineResult<ProgressResponse>;
}

/// `[progress]` section of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Root URL of the progress service.
    pub base_url: String,
    /// Endpoint path appended to `base_url`.
    #[serde(default = "default_path")]
    pub path: String,
    /// Per-attempt timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How many past runs are searched for session ids.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_path() -> String {
    "/progress".to_string()
}

fn default_timeout_ms() -> u64 {
    6000
}

fn default_history_limit() -> usize {
    10
}

impl ProgressConfig {
    /// Defaults for everything but the URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            path: default_path(),
            timeout_ms: default_timeout_ms(),
            history_limit: default_history_limit(),
        }
    }
}

/// [`ProgressClient`] over HTTP: `GET {base_url}{path}?session_id=...`.
pub struct HttpProgressClient {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpProgressClient {
    pub fn new(config: &ProgressConfig) -> ScoutlineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ScoutlineError::Http(format!("Failed to build HTTP client: {e}")))?;
        let endpoint = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.path.trim_start_matches('/')
        );
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ProgressClient for HttpProgressClient {
    async fn query_progress(&self, session_id: Option<&str>) -> ScoutlineResult<ProgressResponse> {
        let mut request = self.client.get(&self.endpoint);
        if let Some(id) = session_id {
            request = request.query(&[("session_id", id)]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                ScoutlineError::UpstreamUnavailable(format!("Progress service unreachable: {e}"))
            } else {
                ScoutlineError::Http(format!("Progress request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), session_id = ?session_id, "Progress service returned an error status");
            return Ok(ProgressResponse::default());
        }

        response
            .json::<ProgressResponse>()
            .await
            .map_err(|e| ScoutlineError::Http(format!("Invalid progress response: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        let mut cfg = ProgressConfig::new("http://jobs.local:8000/");
        let client = HttpProgressClient::new(&cfg).unwrap();
        assert_eq!(client.endpoint(), "http://jobs.local:8000/progress");

        cfg.path = "api/v1/progress".into();
        let client = HttpProgressClient::new(&cfg).unwrap();
        assert_eq!(client.endpoint(), "http://jobs.local:8000/api/v1/progress");
    }

    #[test]
    fn test_config_defaults() {
        let cfg: ProgressConfig =
            serde_json::from_str(r#"{"base_url": "http://localhost:8000"}"#).unwrap();
        assert_eq!(cfg.path, "/progress");
        assert_eq!(cfg.timeout_ms, 6000);
        assert_eq!(cfg.history_limit, 10);
    }
}
