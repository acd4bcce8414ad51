//! Per-owner aggregation of agent counters and recent run history.

use chrono::{DateTime, Utc};
use scoutline_core::{Agent, Run, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Condensed view of a run for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub agent_name: Option<String>,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub items_processed: u64,
    pub items_added: u64,
    pub summary: Option<String>,
}

/// Totals across every agent of one owner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerStatistics {
    pub total_agents: usize,
    pub active_agents: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_category: BTreeMap<String, usize>,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Successful over total runs, 0.0 when nothing ran.
    pub success_rate: f64,
    pub total_items_processed: u64,
    pub total_items_added: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub recent_runs: Vec<RunSummary>,
}

/// Fold agent counters and the given recent runs (newest first) into one report.
pub fn aggregate(agents: &[Agent], recent_runs: &[Run], recent_limit: usize) -> OwnerStatistics {
    let mut stats = OwnerStatistics {
        total_agents: agents.len(),
        ..OwnerStatistics::default()
    };

    for agent in agents {
        if agent.active {
            stats.active_agents += 1;
        }
        *stats.by_status.entry(agent.status.to_string()).or_default() += 1;
        *stats.by_category.entry(agent.category.to_string()).or_default() += 1;

        let counters = &agent.statistics;
        stats.total_runs += counters.total_runs;
        stats.successful_runs += counters.successful_runs;
        stats.failed_runs += counters.failed_runs;
        stats.total_items_processed += counters.total_items_processed;
        stats.total_items_added += counters.total_items_added;

        stats.last_run_at = stats.last_run_at.max(agent.last_run_at);
    }

    if stats.total_runs > 0 {
        stats.success_rate = stats.successful_runs as f64 / stats.total_runs as f64;
    }

    stats.recent_runs = recent_runs
        .iter()
        .take(recent_limit)
        .map(|run| RunSummary {
            id: run.id,
            agent_id: run.agent_id,
            agent_name: agents
                .iter()
                .find(|a| a.id == run.agent_id)
                .map(|a| a.name.clone()),
            status: run.status,
            start_time: run.start_time,
            end_time: run.end_time,
            items_processed: run.items_processed,
            items_added: run.items_added,
            summary: run.summary().map(str::to_string),
        })
        .collect();

    stats
}
