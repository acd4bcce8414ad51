//! Core types and error definitions for the Scoutline agent engine.
//!
//! This crate provides the data model shared across all Scoutline crates:
//! agents, their runs, and the error taxonomy the orchestrator surfaces.
//!
//! # Main types
//!
//! - [`Agent`] — A user-owned definition of recurring or on-demand work.
//! - [`Run`] — One recorded execution attempt of an agent.
//! - [`ScoutlineError`] — Unified error enum for all Scoutline subsystems.
//! - [`ScoutlineResult`] — Convenience alias for `Result<T, ScoutlineError>`.
//! - [`ExecutorError`] — Typed failure returned by executors.

/// Agent model, status, category and statistics.
pub mod agent;
/// Error types.
pub mod error;
/// Run model, logs and partial updates.
pub mod run;

pub use agent::{Agent, AgentStatistics, AgentStatus, Category, ClaimGuard};
pub use error::{ExecutorError, ScoutlineError, ScoutlineResult};
pub use run::{
    LogLevel, Run, RunLog, RunPatch, RunStatus, DURATION_KEY, SESSION_ID_KEY, SUMMARY_KEY,
};
