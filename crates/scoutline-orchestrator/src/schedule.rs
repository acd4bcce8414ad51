//! Next-run computation for agent schedule expressions.
//!
//! Only two shapes of the five-field `minute hour day month weekday` form are
//! understood: an hourly interval (`* */N * * *`) and a fixed daily time
//! (`M H * * *`). Day, month and weekday fields are ignored. Everything else
//! runs again six hours from now.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Hours added when the expression cannot be interpreted.
pub const FALLBACK_INTERVAL_HOURS: i64 = 6;

fn hour_interval_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^\*/(\d+)$").ok())
        .as_ref()
}

/// Compute when an agent with `expression` should run next, relative to `now`.
pub fn next_run_time(expression: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    interpret(expression, now).unwrap_or_else(|| now + Duration::hours(FALLBACK_INTERVAL_HOURS))
}

/// Whether `expression` has the five fields the calculator expects.
///
/// A `false` here is not an error: the calculator falls back to the default
/// interval. Callers use it to warn at creation time.
pub fn is_well_formed(expression: &str) -> bool {
    expression.split_whitespace().count() == 5
}

fn interpret(expression: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let [minute, hour, _day, _month, _weekday] = fields.as_slice() else {
        return None;
    };

    if let Some(caps) = hour_interval_pattern().and_then(|re| re.captures(hour)) {
        let hours: i64 = caps[1].parse().ok()?;
        if hours == 0 {
            return None;
        }
        return Some(now + Duration::hours(hours));
    }

    if *hour != "*" && *minute != "*" {
        let hour: u32 = hour.parse().ok()?;
        let minute: u32 = minute.parse().ok()?;
        let at = NaiveTime::from_hms_opt(hour, minute, 0)?;
        let today = now.date_naive().and_time(at).and_utc();
        return Some(if today <= now {
            today + Duration::days(1)
        } else {
            today
        });
    }

    None
}
