mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::ScoutlineConfig;
use scoutline_channels::{NotifierSet, TelegramNotifier};
use scoutline_orchestrator::{
    AgentPatch, BroadcastEventSink, ExecuteOptions, ExecutorRegistry, NewAgent, Orchestrator,
    Scheduler,
};
use scoutline_progress::{HttpProgressClient, ProgressBridge};
use scoutline_store::{AgentFilter, AgentStore, FileStore, RunQuery};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "scoutline", about = "Scoutline: scheduled agent orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "scoutline.toml")]
    config: PathBuf,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    plain_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler until Ctrl-C
    Serve,
    /// Manage agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Per-owner statistics
    Stats {
        #[arg(long)]
        owner: String,
    },
    /// List categories that have an executor
    Categories,
}

#[derive(Subcommand)]
enum AgentAction {
    /// Create an agent
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: String,
        /// Five-field schedule, e.g. "0 */6 * * *"
        #[arg(long)]
        schedule: String,
        /// Executor configuration as a JSON object
        #[arg(long)]
        config_json: Option<String>,
        /// Create without scheduling it
        #[arg(long)]
        inactive: bool,
    },
    /// List an owner's agents
    List {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Change name, schedule, configuration or active flag
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        schedule: Option<String>,
        #[arg(long)]
        config_json: Option<String>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Execute now
    Run {
        id: Uuid,
        /// Take over even if the current run is not stuck yet
        #[arg(long)]
        force: bool,
    },
    /// Stop scheduled execution
    Pause { id: Uuid },
    /// Resume scheduled execution
    Resume { id: Uuid },
    /// Return a running or errored agent to idle
    Reset { id: Uuid },
    /// Delete an agent (runs are kept)
    Delete { id: Uuid },
    /// Running / stuck state
    Status { id: Uuid },
    /// Progress of the external job behind the agent
    Progress { id: Uuid },
    /// Recent runs, newest first
    Runs {
        id: Uuid,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_tracing(plain: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if plain {
        builder.init();
    } else {
        builder.json().init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_configuration(raw: &str) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    serde_json::from_str(raw).context("--config-json must be a JSON object")
}

struct App {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn AgentStore>,
    events: Arc<BroadcastEventSink>,
}

async fn build(config: &ScoutlineConfig) -> anyhow::Result<App> {
    let store: Arc<dyn AgentStore> = Arc::new(FileStore::new(config.data_dir.clone()).await?);

    let registry = Arc::new(ExecutorRegistry::new());
    let count = scoutline_builtins::register_builtins(&registry, &config.executors)?;
    info!(count, "Executors registered");

    let events = Arc::new(BroadcastEventSink::new(256));
    let mut orchestrator = Orchestrator::new(store.clone(), registry, events.clone())
        .with_config(config.engine.clone());

    if let Some(telegram) = &config.telegram {
        let mut notifiers = NotifierSet::new();
        notifiers.add(Arc::new(TelegramNotifier::new(telegram.clone())?));
        info!(notifiers = ?notifiers.names(), "Run reports enabled");
        orchestrator = orchestrator.with_notifier(Arc::new(notifiers));
    }

    Ok(App {
        orchestrator: Arc::new(orchestrator),
        store,
        events,
    })
}

async fn serve(app: App, config: &ScoutlineConfig) -> anyhow::Result<()> {
    let mut events = app.events.subscribe();
    tokio::spawn(async move {
        while let Ok(envelope) = events.recv().await {
            debug!(
                channel = %envelope.channel,
                event = %envelope.event,
                agent_id = %envelope.payload.agent_id,
                message = %envelope.payload.message,
                "Agent event"
            );
        }
    });

    let scheduler = if config.scheduler.enabled {
        Some(Scheduler::new(app.orchestrator.clone(), config.scheduler.clone()).start())
    } else {
        info!("Scheduler disabled; only manual runs will execute");
        None
    };

    info!(data_dir = %config.data_dir.display(), "Scoutline running");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    if let Some(handle) = scheduler {
        handle.abort();
    }
    Ok(())
}

async fn agent_command(
    app: &App,
    config: &ScoutlineConfig,
    action: AgentAction,
) -> anyhow::Result<()> {
    let orchestrator = &app.orchestrator;
    match action {
        AgentAction::Create {
            owner,
            name,
            category,
            schedule,
            config_json,
            inactive,
        } => {
            let mut new = NewAgent::new(name, category, schedule);
            if let Some(raw) = config_json {
                new = new.with_configuration(parse_configuration(&raw)?);
            }
            if inactive {
                new = new.inactive();
            }
            print_json(&orchestrator.create_agent(&owner, new).await?)
        }
        AgentAction::List {
            owner,
            category,
            active,
        } => {
            let mut filter = AgentFilter::owner(owner);
            if let Some(category) = category {
                filter = filter.with_category(category);
            }
            if let Some(active) = active {
                filter = filter.with_active(active);
            }
            print_json(&orchestrator.list_agents(&filter).await?)
        }
        AgentAction::Update {
            id,
            name,
            schedule,
            config_json,
            active,
        } => {
            let configuration = config_json
                .map(|raw| parse_configuration(&raw))
                .transpose()?;
            let patch = AgentPatch {
                name,
                configuration,
                schedule,
                active,
            };
            print_json(&orchestrator.update_agent(id, patch).await?)
        }
        AgentAction::Run { id, force } => {
            let options = if force {
                ExecuteOptions::forced()
            } else {
                ExecuteOptions::default()
            };
            print_json(&orchestrator.execute(id, options).await?)
        }
        AgentAction::Pause { id } => print_json(&orchestrator.pause(id).await?),
        AgentAction::Resume { id } => print_json(&orchestrator.resume(id).await?),
        AgentAction::Reset { id } => print_json(&orchestrator.reset_agent_status(id).await?),
        AgentAction::Delete { id } => {
            let deleted = orchestrator.delete_agent(id).await?;
            print_json(&serde_json::json!({ "id": id, "deleted": deleted }))
        }
        AgentAction::Status { id } => print_json(&orchestrator.agent_status(id).await?),
        AgentAction::Progress { id } => {
            let progress = config
                .progress
                .as_ref()
                .context("No [progress] section in the config file")?;
            let client = HttpProgressClient::new(progress)?;
            let bridge = ProgressBridge::new(app.store.clone(), Arc::new(client))
                .with_history_limit(progress.history_limit);
            print_json(&bridge.query(id).await?)
        }
        AgentAction::Runs { id, limit } => {
            print_json(&orchestrator.list_runs(&RunQuery::for_agent(id, limit)).await?)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.plain_logs);

    let config = ScoutlineConfig::load(&cli.config).await?;
    let app = build(&config).await?;

    match cli.command {
        Commands::Serve => serve(app, &config).await?,
        Commands::Agent { action } => agent_command(&app, &config, action).await?,
        Commands::Stats { owner } => print_json(&app.orchestrator.statistics(&owner).await?)?,
        Commands::Categories => print_json(&app.orchestrator.registry().categories())?,
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_agent_run() {
        let id = Uuid::new_v4();
        let raw = id.to_string();
        let cli = Cli::try_parse_from(["scoutline", "--plain-logs", "agent", "run", raw.as_str(), "--force"])
            .unwrap();
        assert!(cli.plain_logs);
        assert_eq!(cli.config, PathBuf::from("scoutline.toml"));
        match cli.command {
            Commands::Agent {
                action: AgentAction::Run { id: parsed, force },
            } => {
                assert_eq!(parsed, id);
                assert!(force);
            }
            _ => panic!("expected agent run"),
        }
    }

    #[test]
    fn test_rejects_malformed_id() {
        assert!(Cli::try_parse_from(["scoutline", "agent", "status", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_configuration_must_be_object() {
        let parsed = parse_configuration(r#"{"feeds": ["a", "b"], "limit": 5}"#).unwrap();
        assert_eq!(parsed["limit"], 5);
        assert!(parse_configuration("[1, 2]").is_err());
    }

    #[tokio::test]
    async fn test_build_wires_configured_executors() {
        let dir = tempfile::tempdir().unwrap();
        let config: ScoutlineConfig = toml::from_str(&format!(
            r#"
data_dir = "{}"

[[executors]]
category = "news"
url = "http://127.0.0.1:9/run"
"#,
            dir.path().join("data").display()
        ))
        .unwrap();

        let app = build(&config).await.unwrap();
        assert_eq!(app.orchestrator.registry().categories(), vec!["news".to_string()]);

        let agent = app
            .orchestrator
            .create_agent("user-1", NewAgent::new("digest", "news", "0 7 * * *"))
            .await
            .unwrap();
        assert!(app.store.find_agent(agent.id).await.unwrap().is_some());
    }
}
