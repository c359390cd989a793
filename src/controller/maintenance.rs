//! # Maintenance Windows
//!
//! Certificate renewal restarts the managers, so it is deferred to the maintenance
//! time windows of the cluster. Windows are Quartz-style cron expressions (seconds
//! first, `?` allowed for day-of-month or day-of-week) evaluated in UTC.

use crate::controller::reconciler::Reconciliation;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use tracing::warn;

/// Whether `now` falls into one of the maintenance windows
///
/// No windows means renewal may happen at any time. An unparsable window makes the
/// whole check fail closed, so a typo never causes an unexpected restart.
pub fn is_satisfied(
    reconciliation: &Reconciliation,
    windows: &[String],
    now: DateTime<Utc>,
) -> bool {
    if windows.is_empty() {
        return true;
    }

    let mut satisfied = false;
    for window in windows {
        match parse_window(window) {
            Ok(schedule) => satisfied |= schedule.includes(now),
            Err(e) => {
                warn!(
                    reconciliation = %reconciliation,
                    window = %window,
                    error = %e,
                    "Invalid maintenance time window, treating windows as unsatisfied"
                );
                return false;
            }
        }
    }
    satisfied
}

fn parse_window(window: &str) -> Result<Schedule, cron::error::Error> {
    // `?` means "no specific value" in Quartz, which is `*` for a single instant
    Schedule::from_str(&window.trim().replace('?', "*"))
}
