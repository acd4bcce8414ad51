use serde::{Deserialize, Serialize};

/// Thresholds and limits used by the [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// A running agent whose last run started longer ago than this is stuck
    /// and may be reset by the next execute call.
    #[serde(default = "default_stuck_threshold_secs")]
    pub stuck_threshold_secs: u64,
    /// Advisory threshold: past this, status queries report "running long".
    #[serde(default = "default_running_long_secs")]
    pub running_long_secs: u64,
    /// How many recent runs the statistics report includes.
    #[serde(default = "default_recent_runs_limit")]
    pub recent_runs_limit: usize,
}

fn default_stuck_threshold_secs() -> u64 {
    600
}

fn default_running_long_secs() -> u64 {
    300
}

fn default_recent_runs_limit() -> usize {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stuck_threshold_secs: default_stuck_threshold_secs(),
            running_long_secs: default_running_long_secs(),
            recent_runs_limit: default_recent_runs_limit(),
        }
    }
}

impl EngineConfig {
    /// Stuck threshold as a chrono duration.
    pub fn stuck_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stuck_threshold_secs as i64)
    }

    /// Running-long threshold as a chrono duration.
    pub fn running_long(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.running_long_secs as i64)
    }
}

/// Settings for the due-agent polling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether `serve` starts the loop at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Seconds between polls.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Maximum runs executing at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Maximum due agents fetched per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_tick_secs() -> u64 {
    30
}

fn default_max_concurrent() -> usize {
    4
}

fn default_batch_size() -> usize {
    50
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            tick_secs: default_tick_secs(),
            max_concurrent: default_max_concurrent(),
            batch_size: default_batch_size(),
        }
    }
}
