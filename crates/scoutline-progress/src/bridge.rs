use crate::client::ProgressClient;
use crate::types::{ProgressDiagnostics, ProgressPayload, ProgressReport};
use scoutline_core::{Agent, Run, RunPatch, ScoutlineError, ScoutlineResult};
use scoutline_store::{AgentStore, RunQuery};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Finds the external job behind an agent without knowing its session id.
///
/// Candidates are tried in order: the open run's session id, session ids of
/// recent runs (newest first), a wildcard keyed by agent id, and the bare
/// agent id. If none reports progress an unfiltered query is the last resort.
pub struct ProgressBridge {
    store: Arc<dyn AgentStore>,
    client: Arc<dyn ProgressClient>,
    history_limit: usize,
}

impl ProgressBridge {
    /// Bridge searching the last ten runs.
    pub fn new(store: Arc<dyn AgentStore>, client: Arc<dyn ProgressClient>) -> Self {
        Self {
            store,
            client,
            history_limit: 10,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Progress of the job behind `agent_id`.
    ///
    /// Fails only when the agent is missing or its category does not track
    /// progress. Every other failure, store errors included, is folded into
    /// [`ProgressReport::diagnostics`].
    pub async fn query(&self, agent_id: Uuid) -> ScoutlineResult<ProgressReport> {
        let agent = match self.store.find_agent(agent_id).await {
            Ok(Some(agent)) => agent,
            Ok(None) => return Err(ScoutlineError::NotFound(format!("agent {agent_id}"))),
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Could not load agent for progress lookup");
                let diagnostics = ProgressDiagnostics {
                    errors: vec![format!("agent lookup: {e}")],
                    ..ProgressDiagnostics::default()
                };
                return Ok(ProgressReport::empty(agent_id, diagnostics));
            }
        };
        if !agent.category.supports_progress() {
            return Err(ScoutlineError::InvalidState(format!(
                "Category '{}' does not report progress",
                agent.category
            )));
        }

        let mut diagnostics = ProgressDiagnostics::default();
        let (running, history) = match self.recent_runs(&agent).await {
            Ok(split) => split,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Could not load run history for progress lookup");
                diagnostics.errors.push(format!("run history: {e}"));
                (None, Vec::new())
            }
        };

        let candidates = candidate_session_ids(agent_id, running.as_ref(), &history);
        for candidate in &candidates {
            diagnostics.attempted_session_ids.push(candidate.clone());
            if let Some(payload) = self.attempt(Some(candidate), &mut diagnostics).await {
                let discovered = payload
                    .session_id
                    .clone()
                    .filter(|s| !s.is_empty())
                    .or_else(|| (!is_wildcard(candidate)).then(|| candidate.clone()));
                debug!(agent_id = %agent_id, candidate = %candidate, "Progress found");
                return Ok(self.finish(agent_id, running.as_ref(), payload, discovered).await);
            }
        }

        diagnostics.used_global_fallback = true;
        if let Some(payload) = self.attempt(None, &mut diagnostics).await {
            let discovered = payload.session_id.clone().filter(|s| !s.is_empty());
            debug!(agent_id = %agent_id, "Progress found through unfiltered query");
            return Ok(self.finish(agent_id, running.as_ref(), payload, discovered).await);
        }

        debug!(
            agent_id = %agent_id,
            attempts = diagnostics.attempted_session_ids.len(),
            reachable = diagnostics.service_reachable,
            "No active progress"
        );
        Ok(ProgressReport::empty(agent_id, diagnostics))
    }

    /// Open run (if any) plus up to `history_limit` past runs, newest first.
    async fn recent_runs(&self, agent: &Agent) -> ScoutlineResult<(Option<Run>, Vec<Run>)> {
        // One extra slot for the open run, which is not part of the history.
        let query = RunQuery::for_agent(agent.id, self.history_limit + 1);
        let (running, mut history) = split_running(self.store.find_runs(&query).await?);
        history.truncate(self.history_limit);
        Ok((running, history))
    }

    /// One query; records failures in `diagnostics`, returns live progress only.
    async fn attempt(
        &self,
        session_id: Option<&str>,
        diagnostics: &mut ProgressDiagnostics,
    ) -> Option<ProgressPayload> {
        match self.client.query_progress(session_id).await {
            Ok(response) => {
                diagnostics.service_reachable = true;
                response.active_payload().cloned()
            }
            Err(e) => {
                if !matches!(e, ScoutlineError::UpstreamUnavailable(_)) {
                    diagnostics.service_reachable = true;
                }
                let label = session_id.unwrap_or("<any>");
                debug!(session_id = %label, error = %e, "Progress attempt failed");
                diagnostics.errors.push(format!("{label}: {e}"));
                None
            }
        }
    }

    async fn finish(
        &self,
        agent_id: Uuid,
        running: Option<&Run>,
        payload: ProgressPayload,
        discovered: Option<String>,
    ) -> ProgressReport {
        if let (Some(session_id), Some(run)) = (&discovered, running) {
            if run.session_id().is_none() {
                match self
                    .store
                    .update_run(run.id, RunPatch::session_id(session_id.clone()))
                    .await
                {
                    Ok(_) => info!(run_id = %run.id, session_id = %session_id, "Recorded discovered session id"),
                    Err(e) => warn!(run_id = %run.id, error = %e, "Could not record discovered session id"),
                }
            }
        }
        ProgressReport::found(agent_id, payload, discovered)
    }
}

fn split_running(runs: Vec<Run>) -> (Option<Run>, Vec<Run>) {
    let mut running = None;
    let mut history = Vec::with_capacity(runs.len());
    for run in runs {
        if running.is_none() && run.is_running() {
            running = Some(run);
        } else {
            history.push(run);
        }
    }
    (running, history)
}

fn wildcard_for(agent_id: Uuid) -> String {
    format!("agent_{agent_id}_*")
}

fn is_wildcard(candidate: &str) -> bool {
    candidate.ends_with('*')
}

/// Ordered, de-duplicated session ids to try for an agent.
///
/// `history` is expected newest first.
pub fn candidate_session_ids(agent_id: Uuid, running: Option<&Run>, history: &[Run]) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |id: &str| {
        if !id.is_empty() && !candidates.iter().any(|c| c == id) {
            candidates.push(id.to_string());
        }
    };

    if let Some(id) = running.and_then(Run::session_id) {
        push(id);
    }
    for id in history.iter().filter_map(Run::session_id) {
        push(id);
    }
    push(&wildcard_for(agent_id));
    push(&agent_id.to_string());
    candidates
}
