//! Conversions from the loosely typed upstream payload into column values.

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tidemark_common::types::UpstreamItem;

/// Calendar-date format used by every upstream date-only field.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("valid date regex"));

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

/// Non-blank string field.
pub fn text(item: &UpstreamItem, key: &str) -> Option<String> {
    item.str_field(key)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Integer field given either as a JSON number or a numeric string.
pub fn int(item: &UpstreamItem, key: &str) -> Option<i64> {
    match item.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Optional date-only field; unparsable values are dropped.
pub fn optional_date(item: &UpstreamItem, key: &str) -> Option<NaiveDate> {
    item.str_field(key).and_then(parse_date)
}

/// Creation timestamp from a date-only field, falling back to `synced_at`.
pub fn created_at(item: &UpstreamItem, key: &str, synced_at: DateTime<Utc>) -> DateTime<Utc> {
    optional_date(item, key)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(synced_at)
}

/// Scan free text such as `"2024-05-01 to 2024-05-03, Berlin"` for calendar dates.
///
/// The first valid date is the start and the second the end. A single date
/// yields a one-day range.
pub fn scan_date_range(raw: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let mut dates = ISO_DATE
        .find_iter(raw)
        .filter_map(|m| parse_date(m.as_str()));

    let start = dates.next();
    let end = dates.next().or(start);
    (start, end)
}

/// JSON list field. Accepts an array or a JSON-encoded array string and
/// defaults to `[]` for anything else, including a missing key.
pub fn json_list(item: &UpstreamItem, key: &str) -> Value {
    match item.get(key) {
        Some(Value::Array(items)) => Value::Array(items.clone()),
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Array(items)) => Value::Array(items),
            _ => Value::Array(Vec::new()),
        },
        _ => Value::Array(Vec::new()),
    }
}
