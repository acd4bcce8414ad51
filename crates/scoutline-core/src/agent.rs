use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle status of an [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Not running; eligible for execution when active.
    Idle,
    /// A run is in flight.
    Running,
    /// The last run failed and needs attention. Not terminal.
    Error,
    /// Paused by the owner.
    Paused,
}

impl AgentStatus {
    /// Lowercase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Running => "running",
            AgentStatus::Error => "error",
            AgentStatus::Paused => "paused",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category selecting which executor handles an agent.
///
/// The known set is small, but any other string is carried through as
/// [`Category::Custom`] so new executors can be registered without a release.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    /// News gathering from feeds and sites.
    News,
    /// Social-media monitoring.
    Social,
    /// Anything else.
    Custom(String),
}

impl Category {
    /// Wire name used as the registry key.
    pub fn as_str(&self) -> &str {
        match self {
            Category::News => "news",
            Category::Social => "social",
            Category::Custom(name) => name,
        }
    }

    /// Whether agents of this category run long external jobs that report progress.
    pub fn supports_progress(&self) -> bool {
        matches!(self, Category::News)
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        match value.as_str() {
            "news" => Category::News,
            "social" => Category::Social,
            _ => Category::Custom(value),
        }
    }
}

impl From<&str> for Category {
    fn from(value: &str) -> Self {
        Category::from(value.to_string())
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        match value {
            Category::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters accumulated over every run of an agent. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatistics {
    /// Runs attempted (successful + failed).
    pub total_runs: u64,
    /// Runs that completed.
    pub successful_runs: u64,
    /// Runs that failed.
    pub failed_runs: u64,
    /// Items the executor looked at, summed over successful runs.
    pub total_items_processed: u64,
    /// New items the executor stored, summed over successful runs.
    pub total_items_added: u64,
}

impl AgentStatistics {
    /// Account for a completed run.
    pub fn record_success(&mut self, items_processed: u64, items_added: u64) {
        self.total_runs += 1;
        self.successful_runs += 1;
        self.total_items_processed += items_processed;
        self.total_items_added += items_added;
    }

    /// Account for a failed run.
    pub fn record_failure(&mut self) {
        self.total_runs += 1;
        self.failed_runs += 1;
    }
}

/// A persistent, user-owned definition of recurring work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning user.
    pub owner_id: String,
    /// Human-readable name.
    pub name: String,
    /// Executor selector.
    pub category: Category,
    /// Opaque settings handed verbatim to the executor.
    #[serde(default)]
    pub configuration: HashMap<String, serde_json::Value>,
    /// Whether the agent should be scheduled at all.
    pub active: bool,
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// Five-field schedule expression.
    pub schedule: String,
    /// When the last run started.
    pub last_run_at: Option<DateTime<Utc>>,
    /// When the scheduler should run the agent next.
    pub next_run_at: Option<DateTime<Utc>>,
    /// Detail of the last failure.
    pub error_message: Option<String>,
    /// Accumulated run counters.
    #[serde(default)]
    pub statistics: AgentStatistics,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Creates an idle, active agent with an empty configuration.
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<Category>,
        schedule: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            name: name.into(),
            category: category.into(),
            configuration: HashMap::new(),
            active: true,
            status: AgentStatus::Idle,
            schedule: schedule.into(),
            last_run_at: None,
            next_run_at: None,
            error_message: None,
            statistics: AgentStatistics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the executor configuration.
    pub fn with_configuration(mut self, configuration: HashMap<String, serde_json::Value>) -> Self {
        self.configuration = configuration;
        self
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether this agent may be picked up by the scheduler at `now`.
    ///
    /// A `running` agent only counts once its run started more than
    /// `stuck_after` ago; executing it then takes the stale run over.
    pub fn is_due(&self, now: DateTime<Utc>, stuck_after: Duration) -> bool {
        let eligible = match self.status {
            AgentStatus::Idle | AgentStatus::Error => true,
            AgentStatus::Running => self.is_stuck(now, stuck_after),
            AgentStatus::Paused => false,
        };
        self.active && eligible && self.next_run_at.is_some_and(|next| next <= now)
    }

    /// Whether the agent has been `running` for longer than `threshold`.
    pub fn is_stuck(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.status == AgentStatus::Running
            && self.last_run_at.is_some_and(|started| now - started > threshold)
    }
}

/// The `(status, last_run_at)` pair a compare-and-swap claim expects to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimGuard {
    /// Expected status.
    pub status: AgentStatus,
    /// Expected last run start.
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ClaimGuard {
    /// Capture the guard from an agent snapshot.
    pub fn of(agent: &Agent) -> Self {
        Self {
            status: agent.status,
            last_run_at: agent.last_run_at,
        }
    }

    /// Whether the stored agent still matches.
    pub fn matches(&self, agent: &Agent) -> bool {
        agent.status == self.status && agent.last_run_at == self.last_run_at
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_agent_defaults() {
        let agent = Agent::new("user-1", "Tech news", Category::News, "0 */6 * * *");
        assert_eq!(agent.status, AgentStatus::Idle);
        assert!(agent.active);
        assert!(agent.last_run_at.is_none());
        assert!(agent.error_message.is_none());
        assert_eq!(agent.statistics, AgentStatistics::default());
    }

    #[test]
    fn test_category_roundtrip() {
        assert_eq!(Category::from("news"), Category::News);
        assert_eq!(Category::from("social"), Category::Social);
        assert_eq!(Category::from("reddit"), Category::Custom("reddit".into()));

        let json = serde_json::to_string(&Category::Custom("reddit".into())).unwrap();
        assert_eq!(json, "\"reddit\"");
        let parsed: Category = serde_json::from_str("\"news\"").unwrap();
        assert_eq!(parsed, Category::News);
    }

    #[test]
    fn test_only_news_supports_progress() {
        assert!(Category::News.supports_progress());
        assert!(!Category::Social.supports_progress());
        assert!(!Category::Custom("rss".into()).supports_progress());
    }

    #[test]
    fn test_statistics_accumulate() {
        let mut stats = AgentStatistics::default();
        stats.record_success(5, 2);
        stats.record_failure();
        stats.record_success(3, 0);
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.successful_runs, 2);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.total_items_processed, 8);
        assert_eq!(stats.total_items_added, 2);
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        let stuck_after = Duration::minutes(10);
        let mut agent = Agent::new("u", "a", "news", "0 */6 * * *");
        assert!(!agent.is_due(now, stuck_after));

        agent.next_run_at = Some(now - Duration::minutes(1));
        assert!(agent.is_due(now, stuck_after));

        agent.status = AgentStatus::Running;
        agent.last_run_at = Some(now - Duration::minutes(2));
        assert!(!agent.is_due(now, stuck_after));

        agent.status = AgentStatus::Error;
        assert!(agent.is_due(now, stuck_after));

        agent.active = false;
        assert!(!agent.is_due(now, stuck_after));
    }

    #[test]
    fn test_stuck_running_agent_is_due() {
        let now = Utc::now();
        let stuck_after = Duration::minutes(10);
        let mut agent = Agent::new("u", "a", "news", "0 */6 * * *");
        agent.status = AgentStatus::Running;
        agent.next_run_at = Some(now - Duration::hours(1));
        agent.last_run_at = Some(now - Duration::hours(3));
        assert!(agent.is_stuck(now, stuck_after));
        assert!(agent.is_due(now, stuck_after));

        // Exactly at the threshold is not stuck yet.
        agent.last_run_at = Some(now - stuck_after);
        assert!(!agent.is_due(now, stuck_after));

        agent.last_run_at = None;
        assert!(!agent.is_due(now, stuck_after));
    }

    #[test]
    fn test_claim_guard_detects_change() {
        let mut agent = Agent::new("u", "a", "news", "0 9 * * *");
        let guard = ClaimGuard::of(&agent);
        assert!(guard.matches(&agent));

        agent.last_run_at = Some(Utc::now());
        assert!(!guard.matches(&agent));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&AgentStatus::Paused).unwrap(), "\"paused\"");
        assert_eq!(AgentStatus::Running.to_string(), "running");
    }
}
