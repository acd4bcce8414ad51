//! `scoutline.toml` loading.

use anyhow::Context;
use scoutline_builtins::RemoteJobConfig;
use scoutline_channels::TelegramConfig;
use scoutline_orchestrator::{EngineConfig, SchedulerConfig};
use scoutline_progress::ProgressConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable overriding `telegram.bot_token`.
pub const TELEGRAM_TOKEN_VAR: &str = "SCOUTLINE_TELEGRAM_TOKEN";

/// Whole configuration file. Every section is optional.
#[derive(Debug, Deserialize)]
pub struct ScoutlineConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Absent means `agent progress` is unavailable.
    #[serde(default)]
    pub progress: Option<ProgressConfig>,
    /// Absent means no run reports are sent.
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub executors: Vec<RemoteJobConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl Default for ScoutlineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            engine: EngineConfig::default(),
            scheduler: SchedulerConfig::default(),
            progress: None,
            telegram: None,
            executors: Vec::new(),
        }
    }
}

impl ScoutlineConfig {
    /// Read and parse `path`, then apply environment overrides.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        config.apply_overrides(std::env::var(TELEGRAM_TOKEN_VAR).ok());
        Ok(config)
    }

    /// A token only takes effect when a `[telegram]` section exists.
    pub fn apply_overrides(&mut self, telegram_token: Option<String>) {
        if let (Some(telegram), Some(token)) = (self.telegram.as_mut(), telegram_token) {
            if !token.trim().is_empty() {
                telegram.bot_token = token;
            }
        }
    }
}
