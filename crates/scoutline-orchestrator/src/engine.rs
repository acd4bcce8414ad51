use crate::config::EngineConfig;
use crate::events::{
    AgentEvent, EventScope, EventSink, RunStats, AGENT_COMPLETED, AGENT_CREATED, AGENT_DELETED,
    AGENT_FAILED, AGENT_PAUSED, AGENT_RESET, AGENT_RESUMED, AGENT_STARTED,
};
use crate::executor::{ExecutionContext, RunHandle};
use crate::registry::ExecutorRegistry;
use crate::schedule::{is_well_formed, next_run_time};
use crate::stats::{aggregate, OwnerStatistics};
use crate::stuck::{is_stuck, RunningState};
use crate::types::{AgentPatch, AgentStatusReport, ExecuteOptions, NewAgent};
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use scoutline_channels::Notifier;
use scoutline_core::{
    Agent, AgentStatus, ClaimGuard, ExecutorError, LogLevel, Run, RunLog, RunPatch, RunStatus,
    ScoutlineError, ScoutlineResult, DURATION_KEY, SUMMARY_KEY,
};
use scoutline_store::{AgentFilter, AgentStore, RunQuery};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Message stored on agents whose last run hit an unreachable upstream.
pub const UPSTREAM_UNAVAILABLE_MESSAGE: &str = "Service temporarily unavailable";

/// Attempts at an optimistic agent update before giving up.
const MAX_UPDATE_ATTEMPTS: usize = 8;

/// Upper bound on open runs inspected when cleaning up after a stuck reset.
const ABANDONED_SCAN_LIMIT: usize = 50;

/// Owns agent and run state and enforces the execution protocol.
///
/// The orchestrator runs no background work of its own; the
/// [`Scheduler`](crate::Scheduler) or a caller triggers [`Orchestrator::execute`].
pub struct Orchestrator {
    store: Arc<dyn AgentStore>,
    registry: Arc<ExecutorRegistry>,
    events: Arc<dyn EventSink>,
    notifier: Option<Arc<dyn Notifier>>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn AgentStore>,
        registry: Arc<ExecutorRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            notifier: None,
            config: EngineConfig::default(),
        }
    }

    /// Send a report through `notifier` after every successful run.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<dyn AgentStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Agent CRUD ──────────────────────────────────────────────────────────

    /// Register a new agent for `owner_id`.
    ///
    /// Malformed schedules are accepted with a warning; they run every six hours.
    pub async fn create_agent(&self, owner_id: &str, new: NewAgent) -> ScoutlineResult<Agent> {
        if new.name.trim().is_empty() {
            return Err(ScoutlineError::InvalidState(
                "Agent name must not be empty".to_string(),
            ));
        }
        warn_if_malformed(&new.schedule);

        let mut agent = Agent::new(owner_id, new.name, new.category, new.schedule)
            .with_configuration(new.configuration);
        agent.active = new.active;
        if agent.active {
            agent.next_run_at = Some(next_run_time(&agent.schedule, Utc::now()));
        }
        self.store.save_agent(&agent).await?;

        info!(agent_id = %agent.id, owner = %owner_id, category = %agent.category, "Agent created");
        self.emit(
            &agent,
            AGENT_CREATED,
            AgentEvent::new(agent.id, agent.status, format!("Agent '{}' created", agent.name)),
        )
        .await;
        Ok(agent)
    }

    /// Change user-editable fields. `next_run_at` follows schedule and active changes;
    /// activating a paused agent returns it to `idle`.
    pub async fn update_agent(&self, id: Uuid, patch: AgentPatch) -> ScoutlineResult<Agent> {
        if let Some(schedule) = &patch.schedule {
            warn_if_malformed(schedule);
        }
        let agent = self
            .modify_agent(id, |agent| {
                if let Some(name) = &patch.name {
                    agent.name = name.clone();
                }
                if let Some(configuration) = &patch.configuration {
                    agent.configuration = configuration.clone();
                }
                let reschedule = patch.schedule.is_some() || patch.active.is_some();
                if let Some(schedule) = &patch.schedule {
                    agent.schedule = schedule.clone();
                }
                if let Some(active) = patch.active {
                    agent.active = active;
                    if active && agent.status == AgentStatus::Paused {
                        agent.status = AgentStatus::Idle;
                    }
                }
                if reschedule {
                    agent.next_run_at = agent
                        .active
                        .then(|| next_run_time(&agent.schedule, Utc::now()));
                }
                Ok(())
            })
            .await?;
        debug!(agent_id = %id, "Agent updated");
        Ok(agent)
    }

    /// Delete an agent. Idempotent; returns whether a record was removed.
    /// Runs are kept for history.
    pub async fn delete_agent(&self, id: Uuid) -> ScoutlineResult<bool> {
        let existing = self.store.find_agent(id).await?;
        let removed = self.store.delete_agent(id).await?;
        if let (true, Some(agent)) = (removed, existing) {
            info!(agent_id = %id, "Agent deleted");
            self.emit(
                &agent,
                AGENT_DELETED,
                AgentEvent::new(id, agent.status, format!("Agent '{}' deleted", agent.name)),
            )
            .await;
        }
        Ok(removed)
    }

    pub async fn get_agent(&self, id: Uuid) -> ScoutlineResult<Agent> {
        self.load(id).await
    }

    pub async fn list_agents(&self, filter: &AgentFilter) -> ScoutlineResult<Vec<Agent>> {
        self.store.find_agents_by(filter).await
    }

    pub async fn list_runs(&self, query: &RunQuery) -> ScoutlineResult<Vec<Run>> {
        self.store.find_runs(query).await
    }

    /// Agents the scheduler should execute at `now`.
    ///
    /// Includes running agents that are stuck, so a crashed run gets taken over.
    pub async fn due_agents(&self, now: DateTime<Utc>, limit: usize) -> ScoutlineResult<Vec<Agent>> {
        self.store
            .find_due_agents(now, self.config.stuck_threshold(), limit)
            .await
    }

    // ── Execution ───────────────────────────────────────────────────────────

    /// Execute one run of agent `id` and return the closed run.
    ///
    /// At most one run per agent is open at a time: the agent is claimed with
    /// a compare-and-swap before the run record is created. A running agent
    /// is only taken over when it is stuck or `options.force` is set; the
    /// previous executor is not cancelled, and whatever it returns later is
    /// dropped without touching the agent or its abandoned run.
    pub async fn execute(&self, id: Uuid, options: ExecuteOptions) -> ScoutlineResult<Run> {
        let agent = self.load(id).await?;
        if !agent.active {
            return Err(ScoutlineError::InvalidState(format!("Agent {id} is inactive")));
        }
        if agent.status == AgentStatus::Paused {
            return Err(ScoutlineError::InvalidState(format!("Agent {id} is paused")));
        }

        let takeover = agent.status == AgentStatus::Running;
        if takeover {
            let stuck = is_stuck(
                agent.status,
                agent.last_run_at,
                Utc::now(),
                self.config.stuck_threshold(),
            );
            if !stuck && !options.force {
                return Err(ScoutlineError::InvalidState(format!(
                    "Agent {id} is already running"
                )));
            }
            warn!(
                agent_id = %id,
                last_run_at = ?agent.last_run_at,
                forced = options.force && !stuck,
                "Resetting running agent"
            );
        }

        let executor = self.registry.lookup(&agent.category)?;

        let started_at = Utc::now();
        let Some(claimed) = self
            .store
            .claim_run(id, ClaimGuard::of(&agent), started_at)
            .await?
        else {
            debug!(agent_id = %id, "Lost claim race");
            return Err(ScoutlineError::InvalidState(format!(
                "Agent {id} is already running"
            )));
        };

        let run = Run::start(&claimed, started_at);
        if let Err(e) = self.store.create_run(&run).await {
            error!(agent_id = %id, error = %e, "Failed to create run record, releasing agent");
            self.release_claim(id, started_at).await;
            return Err(e);
        }

        if takeover {
            self.abandon_open_runs(id, run.id).await;
            self.emit(
                &claimed,
                AGENT_RESET,
                AgentEvent::new(id, AgentStatus::Running, "Previous run abandoned")
                    .with_run(run.id),
            )
            .await;
        }

        info!(agent_id = %id, run_id = %run.id, category = %claimed.category, "Run started");
        self.emit(
            &claimed,
            AGENT_STARTED,
            AgentEvent::new(id, AgentStatus::Running, format!("Agent '{}' started", claimed.name))
                .with_run(run.id),
        )
        .await;

        let handle = RunHandle::new(run, self.store.clone());
        let ctx = ExecutionContext {
            owner_id: claimed.owner_id.clone(),
            agent: claimed,
            run: handle.clone(),
        };

        let outcome = match AssertUnwindSafe(executor.execute(&ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(ExecutorError::Failed(panic_message(panic.as_ref()))),
        };

        match outcome {
            Ok(()) => self.complete_run(&ctx.agent, &handle, started_at).await,
            Err(err) => Err(self.fail_run(&ctx.agent, &handle, started_at, err).await),
        }
    }

    async fn complete_run(
        &self,
        agent: &Agent,
        handle: &RunHandle,
        started_at: DateTime<Utc>,
    ) -> ScoutlineResult<Run> {
        let ended_at = Utc::now();
        let snapshot = handle.snapshot();
        let (processed, added) = (snapshot.items_processed, snapshot.items_added);
        let duration_ms = snapshot.duration(ended_at).num_milliseconds();
        let summary = snapshot
            .summary()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Processed {processed} items, added {added} new"));

        let (run_id, mut patch) = handle.take_patch();
        patch.status = Some(RunStatus::Completed);
        patch.end_time = Some(ended_at);
        patch
            .merge_results
            .insert(SUMMARY_KEY.to_string(), serde_json::Value::String(summary.clone()));
        patch
            .merge_results
            .insert(DURATION_KEY.to_string(), serde_json::json!(duration_ms));
        patch.append_logs.push(RunLog::new(LogLevel::Info, summary.clone()));
        let Some(closed) = self.store.update_open_run(run_id, patch).await? else {
            warn!(agent_id = %agent.id, run_id = %run_id, "Run was abandoned, dropping late result");
            return Err(ScoutlineError::InvalidState(format!(
                "Run {run_id} was abandoned before it finished"
            )));
        };

        let mut owned = false;
        let updated = self
            .modify_agent(agent.id, |current| {
                current.statistics.record_success(processed, added);
                owned = owns_agent(current, started_at);
                if owned {
                    current.status = AgentStatus::Idle;
                    current.error_message = None;
                    current.next_run_at = current
                        .active
                        .then(|| next_run_time(&current.schedule, ended_at));
                }
                Ok(())
            })
            .await;
        match updated {
            Ok(current) if !owned => {
                debug!(agent_id = %agent.id, status = %current.status, "Agent changed during run, status left as is");
            }
            Ok(_) => {}
            Err(ScoutlineError::NotFound(_)) => {
                warn!(agent_id = %agent.id, "Agent deleted while running");
            }
            Err(e) => return Err(e),
        }

        info!(
            agent_id = %agent.id,
            run_id = %run_id,
            items_processed = processed,
            items_added = added,
            duration_ms,
            "Run completed"
        );
        self.emit(
            agent,
            AGENT_COMPLETED,
            AgentEvent::new(agent.id, AgentStatus::Idle, summary.clone())
                .with_run(run_id)
                .with_stats(RunStats {
                    items_processed: processed,
                    items_added: added,
                    duration: duration_ms,
                }),
        )
        .await;
        self.notify(agent, summary);

        Ok(closed)
    }

    /// Record a failed run and return the error the caller should see.
    async fn fail_run(
        &self,
        agent: &Agent,
        handle: &RunHandle,
        started_at: DateTime<Utc>,
        err: ExecutorError,
    ) -> ScoutlineError {
        let ended_at = Utc::now();
        let unavailable = err.is_unavailable();
        let message = err.message().to_string();

        let snapshot = handle.snapshot();
        let (run_id, mut patch) = handle.take_patch();
        patch.status = Some(RunStatus::Failed);
        patch.end_time = Some(ended_at);
        patch.merge_results.insert(
            DURATION_KEY.to_string(),
            serde_json::json!(snapshot.duration(ended_at).num_milliseconds()),
        );
        patch.append_errors.push(message.clone());
        patch.append_logs.push(RunLog::new(LogLevel::Error, message.clone()));
        match self.store.update_open_run(run_id, patch).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(agent_id = %agent.id, run_id = %run_id, error = %message, "Run was abandoned, dropping late failure");
                return err.into();
            }
            Err(e) => error!(run_id = %run_id, error = %e, "Failed to close failed run"),
        }

        let updated = self
            .modify_agent(agent.id, |current| {
                current.statistics.record_failure();
                if owns_agent(current, started_at) {
                    if unavailable {
                        current.status = AgentStatus::Idle;
                        current.error_message = Some(UPSTREAM_UNAVAILABLE_MESSAGE.to_string());
                    } else {
                        current.status = AgentStatus::Error;
                        current.error_message = Some(message.clone());
                    }
                    current.next_run_at = current
                        .active
                        .then(|| next_run_time(&current.schedule, ended_at));
                }
                Ok(())
            })
            .await;
        if let Err(e) = updated {
            error!(agent_id = %agent.id, error = %e, "Failed to record run failure on agent");
        }

        if unavailable {
            warn!(agent_id = %agent.id, run_id = %run_id, error = %message, "Run failed: upstream unavailable");
        } else {
            error!(agent_id = %agent.id, run_id = %run_id, error = %message, "Run failed");
        }
        let status = if unavailable {
            AgentStatus::Idle
        } else {
            AgentStatus::Error
        };
        self.emit(
            agent,
            AGENT_FAILED,
            AgentEvent::new(agent.id, status, message).with_run(run_id),
        )
        .await;

        err.into()
    }

    /// Undo a claim whose run record could not be created.
    async fn release_claim(&self, id: Uuid, started_at: DateTime<Utc>) {
        let released = self
            .modify_agent(id, |agent| {
                if owns_agent(agent, started_at) {
                    agent.status = AgentStatus::Idle;
                }
                Ok(())
            })
            .await;
        if let Err(e) = released {
            error!(agent_id = %id, error = %e, "Failed to release agent claim");
        }
    }

    /// Close every other open run of the agent after a takeover.
    async fn abandon_open_runs(&self, agent_id: Uuid, current: Uuid) {
        let query =
            RunQuery::for_agent(agent_id, ABANDONED_SCAN_LIMIT).with_status(RunStatus::Running);
        let open = match self.store.find_runs(&query).await {
            Ok(runs) => runs,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Could not list open runs");
                return;
            }
        };
        for run in open.into_iter().filter(|r| r.id != current) {
            let patch = RunPatch {
                status: Some(RunStatus::Failed),
                end_time: Some(Utc::now()),
                append_errors: vec![format!("Run abandoned, superseded by run {current}")],
                ..RunPatch::default()
            };
            match self.store.update_open_run(run.id, patch).await {
                Ok(Some(_)) => warn!(agent_id = %agent_id, run_id = %run.id, "Abandoned run closed"),
                Ok(None) => debug!(run_id = %run.id, "Run closed before it could be abandoned"),
                Err(e) => warn!(run_id = %run.id, error = %e, "Could not close abandoned run"),
            }
        }
    }

    // ── Lifecycle controls ──────────────────────────────────────────────────

    /// Stop scheduling the agent.
    pub async fn pause(&self, id: Uuid) -> ScoutlineResult<Agent> {
        let agent = self
            .modify_agent(id, |agent| {
                agent.status = AgentStatus::Paused;
                agent.active = false;
                agent.next_run_at = None;
                Ok(())
            })
            .await?;
        info!(agent_id = %id, "Agent paused");
        self.emit(&agent, AGENT_PAUSED, AgentEvent::new(id, agent.status, "Agent paused"))
            .await;
        Ok(agent)
    }

    /// Reactivate the agent and schedule its next run.
    ///
    /// A run still in flight keeps the agent `running`.
    pub async fn resume(&self, id: Uuid) -> ScoutlineResult<Agent> {
        let agent = self
            .modify_agent(id, |agent| {
                if agent.status != AgentStatus::Running {
                    agent.status = AgentStatus::Idle;
                }
                agent.active = true;
                agent.next_run_at = Some(next_run_time(&agent.schedule, Utc::now()));
                Ok(())
            })
            .await?;
        info!(agent_id = %id, "Agent resumed");
        self.emit(&agent, AGENT_RESUMED, AgentEvent::new(id, agent.status, "Agent resumed"))
            .await;
        Ok(agent)
    }

    /// Force the agent back to `idle` and clear its error, whatever it is doing.
    pub async fn reset_agent_status(&self, id: Uuid) -> ScoutlineResult<Agent> {
        let agent = self
            .modify_agent(id, |agent| {
                agent.status = AgentStatus::Idle;
                agent.error_message = None;
                Ok(())
            })
            .await?;
        info!(agent_id = %id, "Agent status reset");
        self.emit(&agent, AGENT_RESET, AgentEvent::new(id, agent.status, "Agent status reset"))
            .await;
        Ok(agent)
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Whether the agent is running, running long, stuck, and whether it may execute now.
    pub async fn agent_status(&self, id: Uuid) -> ScoutlineResult<AgentStatusReport> {
        let agent = self.load(id).await?;
        let now = Utc::now();
        let state = RunningState::assess(
            agent.status,
            agent.last_run_at,
            now,
            self.config.running_long(),
            self.config.stuck_threshold(),
        );

        let current_run = if agent.status == AgentStatus::Running {
            let query = RunQuery::for_agent(id, 1).with_status(RunStatus::Running);
            self.store.find_runs(&query).await?.into_iter().next()
        } else {
            None
        };
        let running_for_secs = (agent.status == AgentStatus::Running)
            .then_some(agent.last_run_at)
            .flatten()
            .map(|started| (now - started).num_seconds());

        Ok(AgentStatusReport {
            agent_id: id,
            status: agent.status,
            active: agent.active,
            is_running: agent.status == AgentStatus::Running,
            is_stuck: state == RunningState::Stuck,
            running_long: state == RunningState::RunningLong,
            can_execute: agent.active && agent.status != AgentStatus::Paused && state.can_execute(),
            running_for_secs,
            current_run,
            message: AgentStatusReport::describe(state, agent.active, agent.status),
            error_message: agent.error_message,
        })
    }

    /// Aggregate counters across all of `owner_id`'s agents.
    pub async fn statistics(&self, owner_id: &str) -> ScoutlineResult<OwnerStatistics> {
        let agents = self.store.find_agents_by(&AgentFilter::owner(owner_id)).await?;
        let limit = self.config.recent_runs_limit;
        let runs = self
            .store
            .find_runs(&RunQuery::for_owner(owner_id, limit))
            .await?;
        Ok(aggregate(&agents, &runs, limit))
    }

    // ── Internals ───────────────────────────────────────────────────────────

    async fn load(&self, id: Uuid) -> ScoutlineResult<Agent> {
        self.store
            .find_agent(id)
            .await?
            .ok_or_else(|| ScoutlineError::NotFound(format!("agent {id}")))
    }

    /// Read-modify-write an agent, retrying when another writer got there first.
    async fn modify_agent<F>(&self, id: Uuid, mut apply: F) -> ScoutlineResult<Agent>
    where
        F: FnMut(&mut Agent) -> ScoutlineResult<()> + Send,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut agent = self.load(id).await?;
            let seen = agent.updated_at;
            apply(&mut agent)?;
            agent.touch();
            if self.store.save_agent_if_unchanged(&agent, seen).await? {
                return Ok(agent);
            }
            debug!(agent_id = %id, attempt, "Concurrent agent write, retrying");
        }
        Err(ScoutlineError::Store(format!(
            "agent {id} kept changing during update"
        )))
    }

    async fn emit(&self, agent: &Agent, name: &str, event: AgentEvent) {
        let scopes = [
            EventScope::Agent(agent.id),
            EventScope::Owner(agent.owner_id.clone()),
        ];
        for scope in &scopes {
            if let Err(e) = self.events.emit(scope, name, &event).await {
                warn!(event = name, channel = %scope.channel(), error = %e, "Event emit failed");
            }
        }
    }

    /// Fire-and-forget completion report.
    fn notify(&self, agent: &Agent, summary: String) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let owner_id = agent.owner_id.clone();
        let title = format!("Agent '{}' finished", agent.name);
        let agent_id = agent.id;
        tokio::spawn(async move {
            if let Err(e) = notifier.send_report(&owner_id, &title, &summary).await {
                warn!(agent_id = %agent_id, notifier = %notifier.name(), error = %e, "Run report not delivered");
            }
        });
    }
}

/// Whether the agent is still in the run started at `started_at`.
fn owns_agent(agent: &Agent, started_at: DateTime<Utc>) -> bool {
    agent.status == AgentStatus::Running && agent.last_run_at == Some(started_at)
}

fn warn_if_malformed(schedule: &str) {
    if !is_well_formed(schedule) {
        warn!(schedule = %schedule, "Schedule is not a five-field expression, using the default interval");
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Executor panicked: {detail}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_owns_agent_requires_matching_start() {
        let started = Utc::now();
        let mut agent = Agent::new("u", "a", "news", "0 */6 * * *");
        agent.status = AgentStatus::Running;
        agent.last_run_at = Some(started);
        assert!(owns_agent(&agent, started));
        assert!(!owns_agent(&agent, started - Duration::seconds(1)));

        agent.status = AgentStatus::Paused;
        assert!(!owns_agent(&agent, started));
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "Executor panicked: boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bad"));
        assert_eq!(panic_message(boxed.as_ref()), "Executor panicked: bad");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(boxed.as_ref()), "Executor panicked: unknown panic");
    }
}
