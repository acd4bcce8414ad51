use crate::channel::{format_report, Notifier};
use async_trait::async_trait;
use scoutline_core::{ScoutlineError, ScoutlineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Settings for [`TelegramNotifier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token obtained from @BotFather.
    pub bot_token: String,
    /// Bot API root; overridable for tests and proxies.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Owner id → Telegram chat id.
    #[serde(default)]
    pub chats: HashMap<String, String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

/// Sends run reports through the Telegram Bot API `sendMessage` method.
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
}

// ── Telegram API types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

// ── Implementation ──────────────────────────────────────────────────────────

impl TelegramNotifier {
    /// Build a notifier with its own HTTP client.
    pub fn new(config: TelegramConfig) -> ScoutlineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ScoutlineError::Channel(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    fn chat_for(&self, owner_id: &str) -> ScoutlineResult<&str> {
        self.config
            .chats
            .get(owner_id)
            .map(String::as_str)
            .ok_or_else(|| {
                ScoutlineError::Channel(format!("No Telegram chat configured for owner '{owner_id}'"))
            })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_report(&self, owner_id: &str, title: &str, body: &str) -> ScoutlineResult<()> {
        let chat_id = self.chat_for(owner_id)?;
        let text = format_report(title, body);
        let payload = SendMessageRequest {
            chat_id,
            text: &text,
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ScoutlineError::Channel(format!("Telegram send error: {e}")))?;

        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| ScoutlineError::Channel(format!("Telegram parse error: {e}")))?;

        if !body.ok {
            return Err(ScoutlineError::Channel(format!(
                "Telegram sendMessage failed: {}",
                body.description.unwrap_or_default()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> TelegramConfig {
        let mut chats = HashMap::new();
        chats.insert("owner-1".to_string(), "555".to_string());
        TelegramConfig {
            bot_token: "TOKEN".into(),
            api_base_url: base.to_string(),
            chats,
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_send_report_posts_to_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "555",
                "text": "Agent finished\n\nProcessed 5 items, added 2 new"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(config(&server.uri())).unwrap();
        notifier
            .send_report("owner-1", "Agent finished", "Processed 5 items, added 2 new")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"ok": false, "description": "chat not found"}),
            ))
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(config(&server.uri())).unwrap();
        let err = notifier.send_report("owner-1", "t", "b").await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_unknown_owner_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::new(config(&server.uri())).unwrap();
        let err = notifier.send_report("stranger", "t", "b").await.unwrap_err();
        assert!(matches!(err, ScoutlineError::Channel(_)));
    }

    #[test]
    fn test_config_defaults() {
        let cfg: TelegramConfig = from_json(r#"{"bot_token": "abc"}"#);
        assert_eq!(cfg.api_base_url, "https://api.telegram.org");
        assert_eq!(cfg.timeout_secs, 10);
        assert!(cfg.chats.is_empty());
    }

    fn from_json(json: &str) -> TelegramConfig {
        serde_json::from_str(json).unwrap()
    }
}
