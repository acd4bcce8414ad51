use crate::config::SchedulerConfig;
use crate::engine::Orchestrator;
use crate::types::ExecuteOptions;
use chrono::{DateTime, Utc};
use scoutline_core::{ScoutlineError, ScoutlineResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Outcome counts of one [`Scheduler::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub completed: usize,
    pub failed: usize,
    /// Already running elsewhere or changed state before the claim.
    pub skipped: usize,
}

/// Polls the store for due agents and executes them.
///
/// This is the external trigger for [`Orchestrator::execute`]; the
/// orchestrator itself never schedules anything.
pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    config: SchedulerConfig,
    permits: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, config: SchedulerConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            orchestrator,
            config,
            permits,
        }
    }

    /// Execute every agent due at `now` and wait for all of them.
    pub async fn tick(&self, now: DateTime<Utc>) -> ScoutlineResult<TickReport> {
        let due = self
            .orchestrator
            .due_agents(now, self.config.batch_size)
            .await?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };
        if due.is_empty() {
            return Ok(report);
        }
        tracing::info!(count = due.len(), "Scheduler: executing due agents");

        let mut tasks = JoinSet::new();
        for agent in due {
            let orchestrator = self.orchestrator.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result = orchestrator.execute(agent.id, ExecuteOptions::default()).await;
                (agent.id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => report.completed += 1,
                Ok((agent_id, Err(ScoutlineError::InvalidState(reason)))) => {
                    tracing::debug!(agent_id = %agent_id, reason = %reason, "Scheduler: agent skipped");
                    report.skipped += 1;
                }
                Ok((agent_id, Err(e))) => {
                    tracing::warn!(agent_id = %agent_id, error = %e, "Scheduler: scheduled run failed");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scheduler: execution task aborted");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Start the polling loop on its own task.
    ///
    /// Returns the [`tokio::task::JoinHandle`] so the caller can abort or await it.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.tick_secs.max(1)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(
                tick_secs = self.config.tick_secs,
                max_concurrent = self.config.max_concurrent,
                "Scheduler: started"
            );
            loop {
                interval.tick().await;
                match self.tick(Utc::now()).await {
                    Ok(report) if report.due > 0 => tracing::info!(
                        due = report.due,
                        completed = report.completed,
                        failed = report.failed,
                        skipped = report.skipped,
                        "Scheduler: tick finished"
                    ),
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Scheduler: could not load due agents"),
                }
            }
        })
    }
}
