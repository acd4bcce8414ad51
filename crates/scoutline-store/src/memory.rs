use crate::store::{AgentFilter, AgentStore, RunQuery};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use scoutline_core::{
    Agent, AgentStatus, ClaimGuard, Run, RunPatch, ScoutlineError, ScoutlineResult,
};
use std::collections::HashMap;
use uuid::Uuid;

/// In-process store. Used by tests and single-shot CLI invocations.
#[derive(Default)]
pub struct MemoryStore {
    agents: RwLock<HashMap<Uuid, Agent>>,
    runs: RwLock<HashMap<Uuid, Run>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs, across all agents.
    pub fn run_count(&self) -> usize {
        self.runs.read().len()
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn find_agent(&self, id: Uuid) -> ScoutlineResult<Option<Agent>> {
        Ok(self.agents.read().get(&id).cloned())
    }

    async fn save_agent(&self, agent: &Agent) -> ScoutlineResult<()> {
        self.agents.write().insert(agent.id, agent.clone());
        Ok(())
    }

    async fn save_agent_if_unchanged(
        &self,
        agent: &Agent,
        expected_updated_at: DateTime<Utc>,
    ) -> ScoutlineResult<bool> {
        let mut agents = self.agents.write();
        match agents.get_mut(&agent.id) {
            Some(stored) if stored.updated_at == expected_updated_at => {
                *stored = agent.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_agent(&self, id: Uuid) -> ScoutlineResult<bool> {
        Ok(self.agents.write().remove(&id).is_some())
    }

    async fn find_agents_by(&self, filter: &AgentFilter) -> ScoutlineResult<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .agents
            .read()
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        agents.sort_by_key(|a| a.created_at);
        Ok(agents)
    }

    async fn find_due_agents(
        &self,
        now: DateTime<Utc>,
        stuck_after: Duration,
        limit: usize,
    ) -> ScoutlineResult<Vec<Agent>> {
        let mut due: Vec<Agent> = self
            .agents
            .read()
            .values()
            .filter(|a| a.is_due(now, stuck_after))
            .cloned()
            .collect();
        due.sort_by_key(|a| a.next_run_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_run(
        &self,
        id: Uuid,
        expected: ClaimGuard,
        started_at: DateTime<Utc>,
    ) -> ScoutlineResult<Option<Agent>> {
        let mut agents = self.agents.write();
        let Some(agent) = agents.get_mut(&id) else {
            return Ok(None);
        };
        if !expected.matches(agent) {
            return Ok(None);
        }
        agent.status = AgentStatus::Running;
        agent.last_run_at = Some(started_at);
        agent.error_message = None;
        agent.touch();
        Ok(Some(agent.clone()))
    }

    async fn find_run(&self, id: Uuid) -> ScoutlineResult<Option<Run>> {
        Ok(self.runs.read().get(&id).cloned())
    }

    async fn find_runs(&self, query: &RunQuery) -> ScoutlineResult<Vec<Run>> {
        let runs: Vec<Run> = self
            .runs
            .read()
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        Ok(query.finish(runs))
    }

    async fn create_run(&self, run: &Run) -> ScoutlineResult<()> {
        self.runs.write().insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(&self, id: Uuid, patch: RunPatch) -> ScoutlineResult<Run> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| ScoutlineError::NotFound(format!("run {id}")))?;
        run.apply(patch);
        Ok(run.clone())
    }

    async fn update_open_run(&self, id: Uuid, patch: RunPatch) -> ScoutlineResult<Option<Run>> {
        let mut runs = self.runs.write();
        let run = runs
            .get_mut(&id)
            .ok_or_else(|| ScoutlineError::NotFound(format!("run {id}")))?;
        if !run.is_running() {
            return Ok(None);
        }
        run.apply(patch);
        Ok(Some(run.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use scoutline_core::RunStatus;

    #[tokio::test]
    async fn test_claim_succeeds_once() {
        let store = MemoryStore::new();
        let agent = Agent::new("u", "a", "news", "0 9 * * *");
        store.save_agent(&agent).await.unwrap();

        let guard = ClaimGuard::of(&agent);
        let now = Utc::now();
        let claimed = store.claim_run(agent.id, guard, now).await.unwrap().unwrap();
        assert_eq!(claimed.status, AgentStatus::Running);
        assert_eq!(claimed.last_run_at, Some(now));

        // Same stale guard loses.
        assert!(store.claim_run(agent.id, guard, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_unknown_agent() {
        let store = MemoryStore::new();
        let agent = Agent::new("u", "a", "news", "0 9 * * *");
        let result = store
            .claim_run(agent.id, ClaimGuard::of(&agent), Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_due_agents_ordering() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut later = Agent::new("u", "later", "news", "0 9 * * *");
        later.next_run_at = Some(now - Duration::minutes(1));
        let mut earlier = Agent::new("u", "earlier", "news", "0 9 * * *");
        earlier.next_run_at = Some(now - Duration::minutes(30));
        let mut future = Agent::new("u", "future", "news", "0 9 * * *");
        future.next_run_at = Some(now + Duration::minutes(30));
        for a in [&later, &earlier, &future] {
            store.save_agent(a).await.unwrap();
        }

        let due = store.find_due_agents(now, Duration::minutes(10), 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].name, "earlier");

        let due = store.find_due_agents(now, Duration::minutes(10), 1).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_run_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update_run(Uuid::new_v4(), RunPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScoutlineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_run_applies_patch() {
        let store = MemoryStore::new();
        let agent = Agent::new("u", "a", "news", "0 9 * * *");
        let run = Run::start(&agent, Utc::now());
        store.create_run(&run).await.unwrap();

        let patch = RunPatch {
            status: Some(RunStatus::Completed),
            items_added: Some(3),
            ..RunPatch::default()
        };
        let updated = store.update_run(run.id, patch).await.unwrap();
        assert_eq!(updated.status, RunStatus::Completed);
        assert_eq!(updated.items_added, 3);
        assert_eq!(store.run_count(), 1);
    }

    #[tokio::test]
    async fn test_open_run_update_skips_closed_runs() {
        let store = MemoryStore::new();
        let agent = Agent::new("u", "a", "news", "0 9 * * *");
        let run = Run::start(&agent, Utc::now());
        store.create_run(&run).await.unwrap();

        let close = RunPatch {
            status: Some(RunStatus::Failed),
            append_errors: vec!["abandoned".into()],
            ..RunPatch::default()
        };
        let closed = store.update_open_run(run.id, close).await.unwrap().unwrap();
        assert_eq!(closed.status, RunStatus::Failed);

        let late = RunPatch {
            status: Some(RunStatus::Completed),
            items_added: Some(9),
            ..RunPatch::default()
        };
        assert!(store.update_open_run(run.id, late).await.unwrap().is_none());
        let stored = store.find_run(run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert_eq!(stored.items_added, 0);
    }

    #[tokio::test]
    async fn test_concurrent_closes_have_one_winner() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let agent = Agent::new("u", "a", "news", "0 9 * * *");
        let run = Run::start(&agent, Utc::now());
        store.create_run(&run).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let status = if i % 2 == 0 {
                    RunStatus::Completed
                } else {
                    RunStatus::Failed
                };
                let patch = RunPatch {
                    status: Some(status),
                    ..RunPatch::default()
                };
                store.update_open_run(run.id, patch).await.unwrap().is_some()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
