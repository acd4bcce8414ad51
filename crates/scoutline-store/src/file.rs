use crate::store::{AgentFilter, AgentStore, RunQuery};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use scoutline_core::{
    Agent, AgentStatus, ClaimGuard, Run, RunPatch, ScoutlineError, ScoutlineResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

/// File-based store: one JSON document per agent and per run.
///
/// Every read-modify-write goes through a single async mutex, which makes
/// [`AgentStore::claim_run`] atomic for all users of this process. It does
/// not protect against a second process sharing the directory.
pub struct FileStore {
    agents_dir: PathBuf,
    runs_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub async fn new(dir: PathBuf) -> ScoutlineResult<Self> {
        let agents_dir = dir.join("agents");
        let runs_dir = dir.join("runs");
        tokio::fs::create_dir_all(&agents_dir).await?;
        tokio::fs::create_dir_all(&runs_dir).await?;
        Ok(Self {
            agents_dir,
            runs_dir,
            write_lock: Mutex::new(()),
        })
    }

    fn agent_path(&self, id: Uuid) -> PathBuf {
        self.agents_dir.join(format!("{id}.json"))
    }

    fn run_path(&self, id: Uuid) -> PathBuf {
        self.runs_dir.join(format!("{id}.json"))
    }

    async fn read_doc<T: DeserializeOwned>(path: &Path) -> ScoutlineResult<Option<T>> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        let data = tokio::fs::read_to_string(path).await?;
        let doc = serde_json::from_str(&data).map_err(|e| {
            ScoutlineError::Store(format!("Failed to parse {}: {e}", path.display()))
        })?;
        Ok(Some(doc))
    }

    /// Write through a temp file and rename so readers never see a torn document.
    async fn write_doc<T: Serialize>(path: &Path, doc: &T) -> ScoutlineResult<()> {
        let json = serde_json::to_string_pretty(doc)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    async fn read_all<T: DeserializeOwned>(dir: &Path) -> ScoutlineResult<Vec<T>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut docs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_doc(&path).await {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable document"),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl AgentStore for FileStore {
    async fn find_agent(&self, id: Uuid) -> ScoutlineResult<Option<Agent>> {
        Self::read_doc(&self.agent_path(id)).await
    }

    async fn save_agent(&self, agent: &Agent) -> ScoutlineResult<()> {
        let _guard = self.write_lock.lock().await;
        Self::write_doc(&self.agent_path(agent.id), agent).await
    }

    async fn save_agent_if_unchanged(
        &self,
        agent: &Agent,
        expected_updated_at: DateTime<Utc>,
    ) -> ScoutlineResult<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.agent_path(agent.id);
        match Self::read_doc::<Agent>(&path).await? {
            Some(stored) if stored.updated_at == expected_updated_at => {
                Self::write_doc(&path, agent).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_agent(&self, id: Uuid) -> ScoutlineResult<bool> {
        let _guard = self.write_lock.lock().await;
        let path = self.agent_path(id);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(path).await?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn find_agents_by(&self, filter: &AgentFilter) -> ScoutlineResult<Vec<Agent>> {
        let mut agents: Vec<Agent> = Self::read_all::<Agent>(&self.agents_dir)
            .await?
            .into_iter()
            .filter(|a| filter.matches(a))
            .collect();
        agents.sort_by_key(|a| a.created_at);
        Ok(agents)
    }

    async fn find_due_agents(
        &self,
        now: DateTime<Utc>,
        stuck_after: Duration,
        limit: usize,
    ) -> ScoutlineResult<Vec<Agent>> {
        let mut due: Vec<Agent> = Self::read_all::<Agent>(&self.agents_dir)
            .await?
            .into_iter()
            .filter(|a| a.is_due(now, stuck_after))
            .collect();
        due.sort_by_key(|a| a.next_run_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_run(
        &self,
        id: Uuid,
        expected: ClaimGuard,
        started_at: DateTime<Utc>,
    ) -> ScoutlineResult<Option<Agent>> {
        let _guard = self.write_lock.lock().await;
        let path = self.agent_path(id);
        let Some(mut agent) = Self::read_doc::<Agent>(&path).await? else {
            return Ok(None);
        };
        if !expected.matches(&agent) {
            return Ok(None);
        }
        agent.status = AgentStatus::Running;
        agent.last_run_at = Some(started_at);
        agent.error_message = None;
        agent.touch();
        Self::write_doc(&path, &agent).await?;
        Ok(Some(agent))
    }

    async fn find_run(&self, id: Uuid) -> ScoutlineResult<Option<Run>> {
        Self::read_doc(&self.run_path(id)).await
    }

    async fn find_runs(&self, query: &RunQuery) -> ScoutlineResult<Vec<Run>> {
        let runs: Vec<Run> = Self::read_all::<Run>(&self.runs_dir)
            .await?
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();
        Ok(query.finish(runs))
    }

    async fn create_run(&self, run: &Run) -> ScoutlineResult<()> {
        let _guard = self.write_lock.lock().await;
        Self::write_doc(&self.run_path(run.id), run).await
    }

    async fn update_run(&self, id: Uuid, patch: RunPatch) -> ScoutlineResult<Run> {
        let _guard = self.write_lock.lock().await;
        let path = self.run_path(id);
        let mut run: Run = Self::read_doc(&path)
            .await?
            .ok_or_else(|| ScoutlineError::NotFound(format!("run {id}")))?;
        run.apply(patch);
        Self::write_doc(&path, &run).await?;
        Ok(run)
    }

    async fn update_open_run(&self, id: Uuid, patch: RunPatch) -> ScoutlineResult<Option<Run>> {
        let _guard = self.write_lock.lock().await;
        let path = self.run_path(id);
        let mut run: Run = Self::read_doc(&path)
            .await?
            .ok_or_else(|| ScoutlineError::NotFound(format!("run {id}")))?;
        if !run.is_running() {
            return Ok(None);
        }
        run.apply(patch);
        Self::write_doc(&path, &run).await?;
        Ok(Some(run))
    }
}
