use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use scoutline_core::{Agent, Category, ClaimGuard, Run, RunPatch, RunStatus, ScoutlineResult};
use uuid::Uuid;

/// Selects a user's agents, optionally narrowed by category and active flag.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    /// Owning user.
    pub owner_id: String,
    /// Only this category.
    pub category: Option<Category>,
    /// Only active (or only inactive) agents.
    pub active: Option<bool>,
}

impl AgentFilter {
    /// All agents of `owner_id`.
    pub fn owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Self::default()
        }
    }

    /// Narrow to one category.
    pub fn with_category(mut self, category: impl Into<Category>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Narrow by active flag.
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Whether `agent` passes the filter.
    pub fn matches(&self, agent: &Agent) -> bool {
        agent.owner_id == self.owner_id
            && self.category.as_ref().map_or(true, |c| &agent.category == c)
            && self.active.map_or(true, |a| agent.active == a)
    }
}

/// Selects runs for history and statistics.
#[derive(Debug, Clone)]
pub struct RunQuery {
    /// Only runs of this agent.
    pub agent_id: Option<Uuid>,
    /// Only runs of this owner.
    pub owner_id: Option<String>,
    /// Only runs in this status.
    pub status: Option<RunStatus>,
    /// Maximum number of runs returned.
    pub limit: usize,
    /// Newest first when true, oldest first otherwise.
    pub newest_first: bool,
}

impl Default for RunQuery {
    fn default() -> Self {
        Self {
            agent_id: None,
            owner_id: None,
            status: None,
            limit: 50,
            newest_first: true,
        }
    }
}

impl RunQuery {
    /// Most recent runs of one agent.
    pub fn for_agent(agent_id: Uuid, limit: usize) -> Self {
        Self {
            agent_id: Some(agent_id),
            limit,
            ..Self::default()
        }
    }

    /// Most recent runs of one owner.
    pub fn for_owner(owner_id: impl Into<String>, limit: usize) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            limit,
            ..Self::default()
        }
    }

    /// Narrow by status.
    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether `run` passes the filter (ignores `limit`).
    pub fn matches(&self, run: &Run) -> bool {
        self.agent_id.map_or(true, |id| run.agent_id == id)
            && self.owner_id.as_ref().map_or(true, |o| &run.owner_id == o)
            && self.status.map_or(true, |s| run.status == s)
    }

    /// Sort and truncate an already filtered set.
    pub fn finish(&self, mut runs: Vec<Run>) -> Vec<Run> {
        if self.newest_first {
            runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        } else {
            runs.sort_by_key(|r| r.created_at);
        }
        runs.truncate(self.limit);
        runs
    }
}

/// Persistence contract consumed by the orchestrator.
///
/// Implementations must make [`AgentStore::claim_run`] atomic with respect to
/// every other write on the same agent; it is the only guard against two
/// concurrent executions of one agent.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Load one agent.
    async fn find_agent(&self, id: Uuid) -> ScoutlineResult<Option<Agent>>;

    /// Insert or replace an agent.
    async fn save_agent(&self, agent: &Agent) -> ScoutlineResult<()>;

    /// Replace an agent only if the stored record's `updated_at` still equals
    /// `expected_updated_at`. Returns whether the write happened; a missing
    /// record counts as changed.
    async fn save_agent_if_unchanged(
        &self,
        agent: &Agent,
        expected_updated_at: DateTime<Utc>,
    ) -> ScoutlineResult<bool>;

    /// Remove an agent. Returns whether a record existed.
    async fn delete_agent(&self, id: Uuid) -> ScoutlineResult<bool>;

    /// Agents matching `filter`, oldest first.
    async fn find_agents_by(&self, filter: &AgentFilter) -> ScoutlineResult<Vec<Agent>>;

    /// Active agents whose next run is at or before `now`, earliest first.
    ///
    /// Idle and errored agents qualify; running ones only once their run
    /// started more than `stuck_after` ago.
    async fn find_due_agents(
        &self,
        now: DateTime<Utc>,
        stuck_after: Duration,
        limit: usize,
    ) -> ScoutlineResult<Vec<Agent>>;

    /// Compare-and-swap the agent into `running`.
    ///
    /// If the stored `(status, last_run_at)` equals `expected`, sets
    /// `status = running`, `last_run_at = started_at`, clears the error
    /// message and returns the updated agent. Otherwise returns `None`
    /// and leaves the record untouched.
    async fn claim_run(
        &self,
        id: Uuid,
        expected: ClaimGuard,
        started_at: DateTime<Utc>,
    ) -> ScoutlineResult<Option<Agent>>;

    /// Load one run.
    async fn find_run(&self, id: Uuid) -> ScoutlineResult<Option<Run>>;

    /// Runs matching `query`.
    async fn find_runs(&self, query: &RunQuery) -> ScoutlineResult<Vec<Run>>;

    /// Insert a new run.
    async fn create_run(&self, run: &Run) -> ScoutlineResult<()>;

    /// Apply a partial update and return the stored result.
    async fn update_run(&self, id: Uuid, patch: RunPatch) -> ScoutlineResult<Run>;

    /// Apply `patch` only while the stored run is still `running`.
    ///
    /// The status check and the write are atomic, so of two writers closing
    /// the same run exactly one gets `Some`. Returns `None` when the run was
    /// already closed and leaves it untouched.
    async fn update_open_run(&self, id: Uuid, patch: RunPatch) -> ScoutlineResult<Option<Run>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_agent_filter() {
        let mut agent = Agent::new("u1", "a", Category::News, "0 9 * * *");
        assert!(AgentFilter::owner("u1").matches(&agent));
        assert!(!AgentFilter::owner("u2").matches(&agent));
        assert!(AgentFilter::owner("u1").with_category("news").matches(&agent));
        assert!(!AgentFilter::owner("u1").with_category("social").matches(&agent));

        agent.active = false;
        assert!(!AgentFilter::owner("u1").with_active(true).matches(&agent));
        assert!(AgentFilter::owner("u1").with_active(false).matches(&agent));
    }

    #[test]
    fn test_run_query_sorts_and_limits() {
        let agent = Agent::new("u1", "a", Category::News, "0 9 * * *");
        let base = Utc::now();
        let runs: Vec<Run> = (0..5)
            .map(|i| Run::start(&agent, base + Duration::seconds(i)))
            .collect();
        let newest = runs[4].id;
        let oldest = runs[0].id;

        let picked = RunQuery::for_agent(agent.id, 2).finish(runs.clone());
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].id, newest);

        let query = RunQuery {
            newest_first: false,
            ..RunQuery::for_agent(agent.id, 10)
        };
        let picked = query.finish(runs);
        assert_eq!(picked[0].id, oldest);
        assert_eq!(picked.len(), 5);
    }

    #[test]
    fn test_run_query_status_filter() {
        let agent = Agent::new("u1", "a", Category::News, "0 9 * * *");
        let mut run = Run::start(&agent, Utc::now());
        let query = RunQuery::for_owner("u1", 10).with_status(RunStatus::Completed);
        assert!(!query.matches(&run));
        run.status = RunStatus::Completed;
        assert!(query.matches(&run));
        assert!(!RunQuery::for_owner("someone-else", 10).matches(&run));
    }
}
