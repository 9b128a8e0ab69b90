use std::str::FromStr;

use cron::Schedule;

use tidemark_common::error::{TidemarkError, TidemarkResult};

/// Parse a cron expression. Classic 5-field expressions get a leading
/// seconds field of `0`; 6- and 7-field expressions are used as given.
pub fn parse_schedule(expr: &str) -> TidemarkResult<Schedule> {
    let trimmed = expr.trim();
    let normalized = match trimmed.split_whitespace().count() {
        5 => format!("0 {trimmed}"),
        _ => trimmed.to_string(),
    };

    Schedule::from_str(&normalized)
        .map_err(|e| TidemarkError::Validation(format!("invalid cron expression '{expr}': {e}")))
}
