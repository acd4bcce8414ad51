use crate::stuck::RunningState;
use scoutline_core::{AgentStatus, Category, Run};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Input for [`Orchestrator::create_agent`](crate::Orchestrator::create_agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub configuration: HashMap<String, serde_json::Value>,
    pub schedule: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewAgent {
    /// Active agent with an empty configuration.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<Category>,
        schedule: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            configuration: HashMap::new(),
            schedule: schedule.into(),
            active: true,
        }
    }

    pub fn with_configuration(mut self, configuration: HashMap<String, serde_json::Value>) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// User-editable fields of an agent. `None` leaves the field unchanged.
///
/// Status is not editable here; it moves through execute, pause, resume
/// and reset, and activating a paused agent returns it to idle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub configuration: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Options for [`Orchestrator::execute`](crate::Orchestrator::execute).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExecuteOptions {
    /// Reset a running agent even if it is not stuck. The in-flight
    /// executor, if any, is not cancelled.
    #[serde(default)]
    pub force: bool,
}

impl ExecuteOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Read-only view of whether an agent is running and whether it can run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub agent_id: Uuid,
    pub status: AgentStatus,
    pub active: bool,
    pub is_running: bool,
    /// Past the reset threshold.
    pub is_stuck: bool,
    /// Past the advisory threshold but not stuck.
    pub running_long: bool,
    pub can_execute: bool,
    pub running_for_secs: Option<i64>,
    pub current_run: Option<Run>,
    pub error_message: Option<String>,
    pub message: String,
}

impl AgentStatusReport {
    pub(crate) fn describe(state: RunningState, active: bool, status: AgentStatus) -> String {
        match state {
            RunningState::Stuck => {
                "Agent appears stuck; the next execution will reset it".to_string()
            }
            RunningState::RunningLong => {
                "Agent has been running for a long time; cannot execute yet".to_string()
            }
            RunningState::Normal => "Agent is running".to_string(),
            RunningState::NotRunning if !active => "Agent is inactive".to_string(),
            RunningState::NotRunning => format!("Agent is {status}"),
        }
    }
}
