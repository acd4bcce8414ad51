//! Executors bundled with Scoutline.
//!
//! Most deployments run agent work on a separate job service; the
//! [`RemoteJobExecutor`] forwards a run there over HTTP and records what
//! comes back.
//!
//! # Main entry points
//!
//! - [`register_builtins()`] — Register one [`RemoteJobExecutor`] per configured category.

/// HTTP job-service executor.
pub mod remote_job;

pub use remote_job::{RemoteJobConfig, RemoteJobExecutor};

use scoutline_core::ScoutlineResult;
use scoutline_orchestrator::ExecutorRegistry;
use std::sync::Arc;

/// Register a [`RemoteJobExecutor`] for every entry of `configs`.
///
/// Fails on the first invalid entry without registering anything.
/// Returns the number of executors registered.
pub fn register_builtins(registry: &ExecutorRegistry, configs: &[RemoteJobConfig]) -> ScoutlineResult<usize> {
    let executors = configs
        .iter()
        .map(RemoteJobExecutor::new)
        .collect::<ScoutlineResult<Vec<_>>>()?;
    let count = executors.len();
    for executor in executors {
        registry.register(executor.category().clone(), Arc::new(executor));
    }
    Ok(count)
}
