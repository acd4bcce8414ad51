use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw answer of the progress service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub progress: Option<ProgressPayload>,
}

impl ProgressResponse {
    /// The payload, if the service answered successfully with live progress.
    pub fn active_payload(&self) -> Option<&ProgressPayload> {
        self.progress
            .as_ref()
            .filter(|p| self.success && p.indicates_progress())
    }
}

/// Progress of one external job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressPayload {
    #[serde(default)]
    pub steps: Vec<serde_json::Value>,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default, alias = "is_active", alias = "isActive", alias = "hasActiveProgress")]
    pub active: bool,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

impl ProgressPayload {
    /// Active flag set, or at least one step reported.
    pub fn indicates_progress(&self) -> bool {
        self.active || !self.steps.is_empty()
    }
}

/// Why a lookup came back empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressDiagnostics {
    /// Every session id queried, in order.
    pub attempted_session_ids: Vec<String>,
    /// One entry per failed attempt.
    pub errors: Vec<String>,
    /// Whether any attempt got an HTTP answer.
    pub service_reachable: bool,
    /// Whether the unfiltered query was tried.
    pub used_global_fallback: bool,
}

/// Normalized result of a progress lookup for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub agent_id: Uuid,
    pub steps: Vec<serde_json::Value>,
    pub results: Vec<serde_json::Value>,
    pub has_active_progress: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Present whenever no active progress was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<ProgressDiagnostics>,
}

impl ProgressReport {
    pub(crate) fn found(agent_id: Uuid, payload: ProgressPayload, session_id: Option<String>) -> Self {
        Self {
            agent_id,
            steps: payload.steps,
            results: payload.results,
            has_active_progress: true,
            timestamp: Utc::now(),
            session_id,
            diagnostics: None,
        }
    }

    pub(crate) fn empty(agent_id: Uuid, diagnostics: ProgressDiagnostics) -> Self {
        Self {
            agent_id,
            steps: Vec::new(),
            results: Vec::new(),
            has_active_progress: false,
            timestamp: Utc::now(),
            session_id: None,
            diagnostics: Some(diagnostics),
        }
    }
}
