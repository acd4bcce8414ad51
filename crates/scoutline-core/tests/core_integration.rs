#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::{TimeZone, Utc};
use scoutline_core::*;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// 1. Agent persists through JSON with configuration and statistics intact
// ---------------------------------------------------------------------------

#[test]
fn agent_json_preserves_state() {
    let mut config = HashMap::new();
    config.insert("feeds".to_string(), serde_json::json!(["https://example.org/rss"]));
    let mut agent = Agent::new("user-9", "World news", Category::News, "0 */4 * * *")
        .with_configuration(config);
    agent.status = AgentStatus::Error;
    agent.error_message = Some("feed timeout".into());
    agent.statistics.record_success(10, 3);
    agent.last_run_at = Some(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap());

    let json = serde_json::to_string(&agent).unwrap();
    assert!(json.contains("\"category\":\"news\""));
    assert!(json.contains("\"status\":\"error\""));

    let parsed: Agent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.id, agent.id);
    assert_eq!(parsed.status, AgentStatus::Error);
    assert_eq!(parsed.error_message.as_deref(), Some("feed timeout"));
    assert_eq!(parsed.statistics.total_items_added, 3);
    assert_eq!(parsed.last_run_at, agent.last_run_at);
    assert_eq!(
        parsed.configuration.get("feeds"),
        Some(&serde_json::json!(["https://example.org/rss"]))
    );
}

// ---------------------------------------------------------------------------
// 2. Older records without statistics or configuration still load
// ---------------------------------------------------------------------------

#[test]
fn agent_missing_optional_fields_defaults() {
    let raw = serde_json::json!({
        "id": "7f1b7a3c-3a55-4a5f-9d59-0f6e3b0f3f11",
        "owner_id": "u",
        "name": "legacy",
        "category": "twitter",
        "active": true,
        "status": "idle",
        "schedule": "0 9 * * *",
        "last_run_at": null,
        "next_run_at": null,
        "error_message": null,
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-01T00:00:00Z"
    });
    let agent: Agent = serde_json::from_value(raw).unwrap();
    assert_eq!(agent.category, Category::Custom("twitter".into()));
    assert!(agent.configuration.is_empty());
    assert_eq!(agent.statistics.total_runs, 0);
}

// ---------------------------------------------------------------------------
// 3. Run lifecycle: progress patches then close
// ---------------------------------------------------------------------------

#[test]
fn run_lifecycle_through_patches() {
    let agent = Agent::new("user-1", "Mentions", Category::Social, "0 */2 * * *");
    let start = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
    let mut run = Run::start(&agent, start);

    let mut progress = RunPatch {
        items_processed: Some(7),
        items_added: Some(2),
        ..RunPatch::default()
    };
    progress
        .append_logs
        .push(RunLog::new(LogLevel::Info, "fetched timeline").with_metadata(serde_json::json!({"count": 7})));
    run.apply(progress);

    let end = start + chrono::Duration::seconds(90);
    let mut close = RunPatch {
        status: Some(RunStatus::Completed),
        end_time: Some(end),
        ..RunPatch::default()
    };
    close
        .merge_results
        .insert(SUMMARY_KEY.to_string(), serde_json::json!("Processed 7 items, added 2 new"));
    run.apply(close);

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.items_processed, 7);
    assert_eq!(run.items_added, 2);
    assert_eq!(run.logs.len(), 1);
    assert_eq!(run.summary(), Some("Processed 7 items, added 2 new"));
    assert_eq!(run.duration(end).num_seconds(), 90);
    assert!(run.error_messages.is_empty());
}

// ---------------------------------------------------------------------------
// 4. Error Display and From impls
// ---------------------------------------------------------------------------

#[test]
fn error_display_and_from_impls() {
    let err = ScoutlineError::NotFound("agent 42".to_string());
    assert_eq!(err.to_string(), "Not found: agent 42");

    let err = ScoutlineError::InvalidState("already running".to_string());
    assert_eq!(err.to_string(), "Invalid state: already running");

    let err = ScoutlineError::UpstreamUnavailable("crawler down".to_string());
    assert_eq!(err.to_string(), "Upstream unavailable: crawler down");

    let bad_json = serde_json::from_str::<serde_json::Value>("not json");
    let err: ScoutlineError = bad_json.unwrap_err().into();
    assert!(err.to_string().starts_with("JSON error:"));
    assert_eq!(err.status_code(), 500);

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
    let err: ScoutlineError = io_err.into();
    assert!(err.to_string().starts_with("IO error:"));
}

// ---------------------------------------------------------------------------
// 5. Executor errors keep the upstream / failure split through conversion
// ---------------------------------------------------------------------------

#[test]
fn executor_error_classification_flows_into_taxonomy() {
    let refused: ScoutlineError = ExecutorError::classify("ECONNREFUSED").into();
    assert_eq!(refused.status_code(), 503);

    let failed: ScoutlineError = ExecutorError::classify("unexpected markup").into();
    assert_eq!(failed.status_code(), 400);
    assert_eq!(failed.to_string(), "Execution failed: unexpected markup");
}
