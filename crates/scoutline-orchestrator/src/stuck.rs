//! Detection of agents left in `running` far longer than a run should take.

use chrono::{DateTime, Duration, Utc};
use scoutline_core::AgentStatus;
use serde::{Deserialize, Serialize};

/// Whether an agent with this status and last run start is stuck at `now`.
///
/// True only for `running` agents with a recorded start strictly older than
/// `threshold`.
pub fn is_stuck(
    status: AgentStatus,
    last_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> bool {
    status == AgentStatus::Running && last_run_at.is_some_and(|started| now - started > threshold)
}

/// Where a running agent sits between the advisory and the reset thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    /// Not running.
    NotRunning,
    /// Running within the expected time.
    Normal,
    /// Past the advisory threshold but not yet resettable.
    RunningLong,
    /// Past the reset threshold; the next execute call will reset it.
    Stuck,
}

impl RunningState {
    /// Classify `status`/`last_run_at` at `now` against both thresholds.
    pub fn assess(
        status: AgentStatus,
        last_run_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        running_long: Duration,
        stuck_threshold: Duration,
    ) -> Self {
        if status != AgentStatus::Running {
            return RunningState::NotRunning;
        }
        if is_stuck(status, last_run_at, now, stuck_threshold) {
            return RunningState::Stuck;
        }
        match last_run_at {
            Some(started) if now - started > running_long => RunningState::RunningLong,
            _ => RunningState::Normal,
        }
    }

    /// Whether an execute call would be accepted without `force`.
    pub fn can_execute(self) -> bool {
        matches!(self, RunningState::NotRunning | RunningState::Stuck)
    }
}
