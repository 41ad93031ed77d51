//! Cron schedule helpers
//!
//! Backup schedules use the 6-field format accepted by the `cron` crate
//! (seconds minute hour day-of-month month day-of-week).

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use crate::{PeriodicBackupError, Result};

/// Validate a cron expression
///
/// # Examples
/// ```
/// use periodic_backup_core::schedule::validate_cron_expression;
/// validate_cron_expression("0 0 2 * * *").unwrap(); // Daily at 2 AM
/// assert!(validate_cron_expression("0 2 * * *").is_err()); // 5 fields
/// ```
pub fn validate_cron_expression(expression: &str) -> Result<()> {
    parse_cron_expression(expression).map(|_| ())
}

/// Parse a cron expression and return the Schedule
pub fn parse_cron_expression(expression: &str) -> Result<Schedule> {
    Schedule::from_str(expression).map_err(|e| {
        PeriodicBackupError::Config(format!(
            "'{}' is not a valid cron expression: {}",
            expression, e
        ))
    })
}

/// Next fire time strictly after `after`, `None` if the schedule never fires again.
pub fn next_run(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Check whether a run is due given the last run time
pub fn should_run_backup(
    schedule: &Schedule,
    now: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> bool {
    let reference_time = last_run.unwrap_or_else(|| now - chrono::Duration::days(365));
    match schedule.after(&reference_time).next() {
        Some(next_time) => next_time <= now,
        None => false,
    }
}

/// Human-readable description of a schedule
pub fn describe_schedule(expression: &str) -> String {
    match expression {
        "0 0 * * * *" => "Every hour".to_string(),
        "0 0 0 * * *" | "0 0 2 * * *" => "Daily".to_string(),
        "0 0 2 * * 7" | "0 0 0 * * 7" => "Weekly (Sunday)".to_string(),
        "0 0 2 1 * *" | "0 0 0 1 * *" => "Monthly (1st of month)".to_string(),
        _ => match Schedule::from_str(expression) {
            Ok(schedule) => {
                let next_runs: Vec<_> = schedule
                    .upcoming(Utc)
                    .take(3)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                    .collect();
                if next_runs.is_empty() {
                    expression.to_string()
                } else {
                    format!("Next runs: {}", next_runs.join(", "))
                }
            }
            Err(_) => format!("Invalid: {}", expression),
        },
    }
}
