//! Agent orchestration engine: exclusive execution, scheduling and recovery.
//!
//! The [`Orchestrator`] owns agent and run state. It claims an agent with a
//! compare-and-swap before creating a run, hands the run to the executor
//! registered for the agent's category, and records the outcome. Agents left
//! `running` past the stuck threshold are taken over by the next execution.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Agent CRUD, execution protocol, lifecycle controls and queries.
//! - [`ExecutorRegistry`] — Category → [`Executor`] lookup.
//! - [`RunHandle`] — What an executor uses to report counters, logs and results.
//! - [`Scheduler`] — Polling loop that executes due agents.
//! - [`EventSink`] — Destination for lifecycle events.
//! - [`OwnerStatistics`] — Per-owner aggregate returned by [`Orchestrator::statistics`].

/// Engine and scheduler settings.
pub mod config;
/// The orchestrator itself.
pub mod engine;
/// Lifecycle events and sinks.
pub mod events;
/// Executor contract and run handle.
pub mod executor;
/// Category → executor registry.
pub mod registry;
/// Next-run computation.
pub mod schedule;
/// Due-agent polling loop.
pub mod scheduler;
/// Per-owner statistics.
pub mod stats;
/// Stuck-run detection.
pub mod stuck;
/// Request and report types.
pub mod types;

pub use config::{EngineConfig, SchedulerConfig};
pub use engine::{Orchestrator, UPSTREAM_UNAVAILABLE_MESSAGE};
pub use events::{
    AgentEvent, BroadcastEventSink, EventEnvelope, EventScope, EventSink, NoopEventSink, RunStats,
};
pub use executor::{ExecutionContext, Executor, RunHandle};
pub use registry::ExecutorRegistry;
pub use schedule::{is_well_formed, next_run_time, FALLBACK_INTERVAL_HOURS};
pub use scheduler::{Scheduler, TickReport};
pub use stats::{OwnerStatistics, RunSummary};
pub use stuck::{is_stuck, RunningState};
pub use types::{AgentPatch, AgentStatusReport, ExecuteOptions, NewAgent};
