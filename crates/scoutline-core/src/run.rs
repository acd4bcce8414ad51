use crate::agent::Agent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Key under [`Run::results`] holding the external job's session identifier.
pub const SESSION_ID_KEY: &str = "session_id";
/// Key under [`Run::results`] holding the human-readable summary.
pub const SUMMARY_KEY: &str = "summary";
/// Key under [`Run::results`] holding the run duration in milliseconds.
pub const DURATION_KEY: &str = "duration_ms";

/// Status of a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The executor has not returned yet.
    Running,
    /// The executor returned normally.
    Completed,
    /// The executor raised an error.
    Failed,
}

/// Severity of a [`RunLog`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose detail.
    Debug,
    /// Normal progress.
    Info,
    /// Something odd but not fatal.
    Warn,
    /// A failure.
    Error,
}

/// One append-only log line written during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLog {
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    /// When the line was written.
    pub timestamp: DateTime<Utc>,
}

impl RunLog {
    /// A log line stamped now.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach structured metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// One recorded execution attempt of an [`Agent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier.
    pub id: Uuid,
    /// The agent this run belongs to.
    pub agent_id: Uuid,
    /// Owner inherited from the agent.
    pub owner_id: String,
    /// Current status; closed exactly once.
    pub status: RunStatus,
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run closed.
    pub end_time: Option<DateTime<Utc>>,
    /// Items the executor looked at.
    pub items_processed: u64,
    /// New items the executor stored.
    pub items_added: u64,
    /// Append-only log.
    #[serde(default)]
    pub logs: Vec<RunLog>,
    /// Opaque results, possibly carrying an external session id.
    #[serde(default)]
    pub results: HashMap<String, serde_json::Value>,
    /// Populated only on failure.
    #[serde(default)]
    pub error_messages: Vec<String>,
    /// Insertion time, used for newest-first ordering.
    pub created_at: DateTime<Utc>,
}

impl Run {
    /// A fresh running record for `agent`.
    pub fn start(agent: &Agent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent.id,
            owner_id: agent.owner_id.clone(),
            status: RunStatus::Running,
            start_time: now,
            end_time: None,
            items_processed: 0,
            items_added: 0,
            logs: Vec::new(),
            results: HashMap::new(),
            error_messages: Vec::new(),
            created_at: now,
        }
    }

    /// External session id recorded by the executor, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.results
            .get(SESSION_ID_KEY)
            .and_then(serde_json::Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Summary recorded by the executor, if any.
    pub fn summary(&self) -> Option<&str> {
        self.results.get(SUMMARY_KEY).and_then(serde_json::Value::as_str)
    }

    /// Whether the run is still open.
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Wall-clock duration, up to `now` for open runs.
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.end_time.unwrap_or(now) - self.start_time
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, patch: RunPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(end_time) = patch.end_time {
            self.end_time = Some(end_time);
        }
        if let Some(n) = patch.items_processed {
            self.items_processed = n;
        }
        if let Some(n) = patch.items_added {
            self.items_added = n;
        }
        self.logs.extend(patch.append_logs);
        self.results.extend(patch.merge_results);
        self.error_messages.extend(patch.append_errors);
    }
}

/// Partial update for a stored [`Run`].
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    /// New status.
    pub status: Option<RunStatus>,
    /// Close time.
    pub end_time: Option<DateTime<Utc>>,
    /// Replacement processed counter.
    pub items_processed: Option<u64>,
    /// Replacement added counter.
    pub items_added: Option<u64>,
    /// Log lines to append.
    pub append_logs: Vec<RunLog>,
    /// Result keys to insert or overwrite.
    pub merge_results: HashMap<String, serde_json::Value>,
    /// Error messages to append.
    pub append_errors: Vec<String>,
}

impl RunPatch {
    /// Patch that only records a session id.
    pub fn session_id(session_id: impl Into<String>) -> Self {
        let mut patch = Self::default();
        patch.merge_results.insert(
            SESSION_ID_KEY.to_string(),
            serde_json::Value::String(session_id.into()),
        );
        patch
    }

    /// Patch that mirrors the current progress of `run` (counters, logs past `logs_seen`, results).
    pub fn progress_of(run: &Run, logs_seen: usize) -> Self {
        Self {
            items_processed: Some(run.items_processed),
            items_added: Some(run.items_added),
            append_logs: run.logs.iter().skip(logs_seen).cloned().collect(),
            merge_results: run.results.clone(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn agent() -> Agent {
        Agent::new("owner-1", "Feeds", "news", "30 9 * * *")
    }

    #[test]
    fn test_start_inherits_owner() {
        let agent = agent();
        let run = Run::start(&agent, Utc::now());
        assert_eq!(run.agent_id, agent.id);
        assert_eq!(run.owner_id, "owner-1");
        assert!(run.is_running());
        assert!(run.end_time.is_none());
        assert_eq!(run.items_processed, 0);
    }

    #[test]
    fn test_session_id_ignores_empty_and_non_strings() {
        let mut run = Run::start(&agent(), Utc::now());
        assert!(run.session_id().is_none());

        run.results.insert(SESSION_ID_KEY.into(), serde_json::json!(""));
        assert!(run.session_id().is_none());

        run.results.insert(SESSION_ID_KEY.into(), serde_json::json!(42));
        assert!(run.session_id().is_none());

        run.results.insert(SESSION_ID_KEY.into(), serde_json::json!("crawl-7"));
        assert_eq!(run.session_id(), Some("crawl-7"));
    }

    #[test]
    fn test_apply_patch_appends_and_merges() {
        let mut run = Run::start(&agent(), Utc::now());
        run.logs.push(RunLog::new(LogLevel::Info, "first"));

        let mut patch = RunPatch::session_id("s-1");
        patch.status = Some(RunStatus::Failed);
        patch.end_time = Some(Utc::now());
        patch.append_logs.push(RunLog::new(LogLevel::Error, "second"));
        patch.append_errors.push("boom".into());
        run.apply(patch);

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.end_time.is_some());
        assert_eq!(run.logs.len(), 2);
        assert_eq!(run.error_messages, vec!["boom".to_string()]);
        assert_eq!(run.session_id(), Some("s-1"));
    }

    #[test]
    fn test_progress_patch_only_carries_new_logs() {
        let mut run = Run::start(&agent(), Utc::now());
        run.items_processed = 4;
        run.logs.push(RunLog::new(LogLevel::Info, "a"));
        run.logs.push(RunLog::new(LogLevel::Info, "b"));

        let patch = RunPatch::progress_of(&run, 1);
        assert_eq!(patch.items_processed, Some(4));
        assert_eq!(patch.append_logs.len(), 1);
        assert_eq!(patch.append_logs[0].message, "b");
    }
}
