use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scoutline_core::{AgentStatus, ScoutlineError, ScoutlineResult};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const AGENT_CREATED: &str = "agent:created";
pub const AGENT_DELETED: &str = "agent:deleted";
pub const AGENT_STARTED: &str = "agent:started";
pub const AGENT_COMPLETED: &str = "agent:completed";
pub const AGENT_FAILED: &str = "agent:failed";
pub const AGENT_PAUSED: &str = "agent:paused";
pub const AGENT_RESUMED: &str = "agent:resumed";
pub const AGENT_RESET: &str = "agent:reset";

/// Audience of an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventScope {
    /// Everyone watching this owner's agents.
    Owner(String),
    /// Everyone watching one agent.
    Agent(Uuid),
}

impl EventScope {
    /// Channel name, `user:{owner}` or `agent:{id}`.
    pub fn channel(&self) -> String {
        match self {
            EventScope::Owner(owner) => format!("user:{owner}"),
            EventScope::Agent(id) => format!("agent:{id}"),
        }
    }
}

/// Counters attached to completion events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub items_processed: u64,
    pub items_added: u64,
    /// Run duration in milliseconds.
    pub duration: i64,
}

/// Payload of every lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub agent_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub status: AgentStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
}

impl AgentEvent {
    pub fn new(agent_id: Uuid, status: AgentStatus, message: impl Into<String>) -> Self {
        Self {
            agent_id,
            run_id: None,
            status,
            message: message.into(),
            timestamp: Utc::now(),
            stats: None,
        }
    }

    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn with_stats(mut self, stats: RunStats) -> Self {
        self.stats = Some(stats);
        self
    }
}

/// Destination for lifecycle events.
///
/// Delivery is best-effort: the orchestrator logs a failed emit and moves on.
/// `emit` is awaited inline on the execution path, which keeps one agent's
/// events in order, so it must not block: hand the event to a queue or
/// channel and return. Sinks doing network I/O should spawn it.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish `event` under `name` on the channel of `scope`. Must return promptly.
    async fn emit(&self, scope: &EventScope, name: &str, event: &AgentEvent) -> ScoutlineResult<()>;
}

/// Discards every event.
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _scope: &EventScope, _name: &str, _event: &AgentEvent) -> ScoutlineResult<()> {
        Ok(())
    }
}

/// What subscribers of a [`BroadcastEventSink`] receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub channel: String,
    pub event: String,
    pub payload: AgentEvent,
}

/// Fans events out to in-process subscribers over a tokio broadcast channel.
pub struct BroadcastEventSink {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEventSink {
    /// Sink buffering up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn emit(&self, scope: &EventScope, name: &str, event: &AgentEvent) -> ScoutlineResult<()> {
        if self.tx.receiver_count() == 0 {
            return Ok(());
        }
        self.tx
            .send(EventEnvelope {
                channel: scope.channel(),
                event: name.to_string(),
                payload: event.clone(),
            })
            .map(|_| ())
            .map_err(|e| ScoutlineError::Channel(format!("Event broadcast failed: {e}")))
    }
}
