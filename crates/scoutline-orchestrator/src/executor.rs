use async_trait::async_trait;
use parking_lot::Mutex;
use scoutline_core::{
    Agent, ExecutorError, LogLevel, Run, RunLog, RunPatch, ScoutlineError, ScoutlineResult,
    SESSION_ID_KEY, SUMMARY_KEY,
};
use scoutline_store::AgentStore;
use std::sync::Arc;
use uuid::Uuid;

/// The pluggable strategy that performs the work for one category.
///
/// Implementations report progress through [`ExecutionContext::run`] and
/// return `Err` to fail the run. Panics are caught by the orchestrator and
/// treated as [`ExecutorError::Failed`].
#[async_trait]
pub trait Executor: Send + Sync {
    /// Perform one run.
    async fn execute(&self, ctx: &ExecutionContext) -> Result<(), ExecutorError>;
}

/// Everything an executor gets for one run.
pub struct ExecutionContext {
    /// Snapshot of the agent taken when the run was claimed.
    pub agent: Agent,
    /// Owner the run is attributed to.
    pub owner_id: String,
    /// Handle to the open run record.
    pub run: RunHandle,
}

struct RunBuffer {
    run: Run,
    logs_flushed: usize,
}

/// Shared, mutable view of an open [`Run`].
///
/// Mutations are buffered in memory and reach the store on
/// [`RunHandle::flush`] or when the orchestrator closes the run.
#[derive(Clone)]
pub struct RunHandle {
    inner: Arc<Mutex<RunBuffer>>,
    store: Arc<dyn AgentStore>,
}

impl RunHandle {
    pub(crate) fn new(run: Run, store: Arc<dyn AgentStore>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RunBuffer {
                run,
                logs_flushed: 0,
            })),
            store,
        }
    }

    /// Run id.
    pub fn id(&self) -> Uuid {
        self.inner.lock().run.id
    }

    /// Add to the processed counter.
    pub fn add_processed(&self, n: u64) {
        self.inner.lock().run.items_processed += n;
    }

    /// Add to the added counter.
    pub fn add_added(&self, n: u64) {
        self.inner.lock().run.items_added += n;
    }

    /// Overwrite both counters.
    pub fn set_counts(&self, items_processed: u64, items_added: u64) {
        let mut buf = self.inner.lock();
        buf.run.items_processed = items_processed;
        buf.run.items_added = items_added;
    }

    /// Append a log line.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.push_log(RunLog::new(level, message));
    }

    /// Append a log line carrying structured metadata.
    pub fn log_with(&self, level: LogLevel, message: impl Into<String>, metadata: serde_json::Value) {
        self.push_log(RunLog::new(level, message).with_metadata(metadata));
    }

    fn push_log(&self, entry: RunLog) {
        self.inner.lock().run.logs.push(entry);
    }

    /// Insert or overwrite a result key.
    pub fn set_result(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.lock().run.results.insert(key.into(), value);
    }

    /// Record the human-readable summary for the run.
    pub fn set_summary(&self, summary: impl Into<String>) {
        self.set_result(SUMMARY_KEY, serde_json::Value::String(summary.into()));
    }

    /// Record the external session id used by progress queries.
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        self.set_result(SESSION_ID_KEY, serde_json::Value::String(session_id.into()));
    }

    /// Current in-memory state of the run.
    pub fn snapshot(&self) -> Run {
        self.inner.lock().run.clone()
    }

    /// Persist buffered progress so readers see it before the run closes.
    ///
    /// Fails with [`ScoutlineError::InvalidState`] once the run has been
    /// closed, e.g. abandoned by a takeover; the executor should stop then.
    pub async fn flush(&self) -> ScoutlineResult<()> {
        let (id, patch) = self.take_patch();
        match self.store.update_open_run(id, patch).await? {
            Some(_) => Ok(()),
            None => Err(ScoutlineError::InvalidState(format!("Run {id} is already closed"))),
        }
    }

    /// Patch covering everything not yet persisted, marking it persisted.
    pub(crate) fn take_patch(&self) -> (Uuid, RunPatch) {
        let mut buf = self.inner.lock();
        let patch = RunPatch::progress_of(&buf.run, buf.logs_flushed);
        buf.logs_flushed = buf.run.logs.len();
        (buf.run.id, patch)
    }
}
