use async_trait::async_trait;
use scoutline_core::ScoutlineResult;

/// A destination for run reports addressed to an agent's owner.
///
/// Delivery is best-effort: callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Deliver a report to `owner_id`.
    async fn send_report(&self, owner_id: &str, title: &str, body: &str) -> ScoutlineResult<()>;
}

/// Render a report as a single chat message.
pub fn format_report(title: &str, body: &str) -> String {
    if body.is_empty() {
        title.to_string()
    } else {
        format!("{title}\n\n{body}")
    }
}
