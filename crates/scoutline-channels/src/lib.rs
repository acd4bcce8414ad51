//! Owner notification channels.
//!
//! After a successful run the orchestrator hands a short report to a
//! [`Notifier`]. Delivery never affects the run's outcome.

/// The notifier contract.
pub mod channel;
/// Fan-out over several notifiers.
pub mod manager;
/// Telegram Bot API notifier.
pub mod telegram;

pub use channel::{format_report, Notifier};
pub use manager::NotifierSet;
pub use telegram::{TelegramConfig, TelegramNotifier};
