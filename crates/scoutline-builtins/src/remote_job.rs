use async_trait::async_trait;
use scoutline_core::{Category, ExecutorError, LogLevel, ScoutlineError, ScoutlineResult};
use scoutline_orchestrator::{ExecutionContext, Executor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Longest error body quoted back into a failure message.
const MAX_ERROR_DETAIL: usize = 300;

/// One `[[executors]]` entry of the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteJobConfig {
    /// Category this executor serves.
    pub category: String,
    /// Job endpoint receiving the POST.
    pub url: String,
    /// Whole-request timeout. Jobs answer when they finish, so this is long.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    300
}

impl RemoteJobConfig {
    pub fn new(category: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            url: url.into(),
            timeout_secs: default_timeout_secs(),
            headers: HashMap::new(),
        }
    }
}

#[derive(Serialize)]
struct JobRequest<'a> {
    agent_id: Uuid,
    run_id: Uuid,
    owner_id: &'a str,
    agent_name: &'a str,
    configuration: &'a HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JobOutcome {
    #[serde(default)]
    items_processed: u64,
    #[serde(default)]
    items_added: u64,
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    logs: Vec<JobLog>,
    #[serde(default)]
    results: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JobLog {
    Plain(String),
    Structured {
        #[serde(default = "default_log_level")]
        level: LogLevel,
        message: String,
    },
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Runs an agent by POSTing it to an external job service.
///
/// The service answers when the job is done with the counters, an optional
/// session id and summary, and any log lines worth keeping.
pub struct RemoteJobExecutor {
    category: Category,
    url: String,
    client: reqwest::Client,
}

impl RemoteJobExecutor {
    /// Validates the URL and builds the HTTP client.
    pub fn new(config: &RemoteJobConfig) -> ScoutlineResult<Self> {
        if config.category.trim().is_empty() {
            return Err(ScoutlineError::Config("Executor category must not be empty".into()));
        }

        let parsed = reqwest::Url::parse(&config.url)
            .map_err(|e| ScoutlineError::Config(format!("Invalid executor URL '{}': {e}", config.url)))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ScoutlineError::Config(format!(
                    "Unsupported scheme '{scheme}' for executor '{}'. Only http/https allowed.",
                    config.category
                )));
            }
        }

        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ScoutlineError::Config(format!("Invalid header name '{key}': {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| ScoutlineError::Config(format!("Invalid value for header '{key}': {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ScoutlineError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            category: Category::from(config.category.clone()),
            url: config.url.clone(),
            client,
        })
    }

    pub fn category(&self) -> &Category {
        &self.category
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Executor for RemoteJobExecutor {
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError> {
        let run_id = ctx.run.id();
        let request = JobRequest {
            agent_id: ctx.agent.id,
            run_id,
            owner_id: &ctx.owner_id,
            agent_name: &ctx.agent.name,
            configuration: &ctx.agent.configuration,
        };

        info!(agent_id = %ctx.agent.id, run_id = %run_id, url = %self.url, "Dispatching remote job");
        ctx.run.log(LogLevel::Info, format!("Dispatching job to {}", self.url));

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ExecutorError::Unavailable(format!("Job service unreachable: {e}"))
                } else {
                    ExecutorError::classify(format!("Job request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ExecutorError::Failed(format!("Failed to read job response: {e}")))?;
        if body.len() > MAX_RESPONSE_SIZE {
            return Err(ExecutorError::Failed(format!(
                "Job response too large: {} bytes (max: {MAX_RESPONSE_SIZE} bytes)",
                body.len()
            )));
        }
        let body = String::from_utf8_lossy(&body);

        if !status.is_success() {
            return Err(ExecutorError::classify(format!(
                "Job service returned {}: {}",
                status.as_u16(),
                error_detail(&body)
            )));
        }

        let outcome: JobOutcome = serde_json::from_str(&body)
            .map_err(|e| ExecutorError::Failed(format!("Invalid job response: {e}")))?;

        // The service only reports the session once the job is over; while it
        // runs, progress lookups fall back to the agent-id and wildcard sessions.
        if let Some(session_id) = outcome.session_id.filter(|s| !s.is_empty()) {
            ctx.run.set_session_id(session_id);
        }

        for entry in outcome.logs {
            match entry {
                JobLog::Plain(message) => ctx.run.log(LogLevel::Info, message),
                JobLog::Structured { level, message } => ctx.run.log(level, message),
            }
        }
        for (key, value) in outcome.results {
            ctx.run.set_result(key, value);
        }
        ctx.run.set_counts(outcome.items_processed, outcome.items_added);
        if let Some(summary) = outcome.summary.filter(|s| !s.trim().is_empty()) {
            ctx.run.set_summary(summary);
        }

        info!(
            run_id = %run_id,
            items_processed = outcome.items_processed,
            items_added = outcome.items_added,
            "Remote job finished"
        );
        Ok(())
    }
}

/// Best human-readable part of an error body.
fn error_detail(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body).ok().and_then(|v| {
        ["error", "detail", "message"]
            .iter()
            .find_map(|k| v.get(*k).and_then(serde_json::Value::as_str).map(str::to_string))
    });
    let detail = from_json.unwrap_or_else(|| body.trim().to_string());
    if detail.len() > MAX_ERROR_DETAIL {
        let mut end = MAX_ERROR_DETAIL;
        while !detail.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &detail[..end])
    } else {
        detail
    }
}
