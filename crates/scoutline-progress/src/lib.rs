//! Progress lookups for jobs that agents start on an external service.
//!
//! Executors often hand work to a remote service and return before it
//! finishes. [`ProgressBridge`] finds that job again from what the store
//! knows about the agent's runs, asks the service through a
//! [`ProgressClient`], and degrades to an empty [`ProgressReport`] with
//! [`ProgressDiagnostics`] when nothing is found.

/// Session discovery and report assembly.
pub mod bridge;
/// Transport to the progress service.
pub mod client;
/// Wire and report types.
pub mod types;

pub use bridge::{candidate_session_ids, ProgressBridge};
pub use client::{HttpProgressClient, ProgressClient, ProgressConfig};
pub use types::{ProgressDiagnostics, ProgressPayload, ProgressReport, ProgressResponse};
