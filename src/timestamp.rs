//! Timestamp encoding for stored documents and relative-age labels.
//!
//! Documents may carry timestamps in three shapes. [`parse_timestamp`]
//! accepts them in this order:
//!
//! 1. native timestamp object: `{"$timestamp": {"seconds": 1700000000, "nanos": 0}}`
//! 2. an already-converted date: an RFC 3339 string
//! 3. a raw epoch-seconds container: `{"seconds": 1700000000, "nanoseconds": 0}`
//!
//! Anything else decodes to the current time.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde_json::{json, Value};

pub const NATIVE_KEY: &str = "$timestamp";

/// Encode a timestamp the way the backend stores it.
pub fn to_value(dt: DateTime<Utc>) -> Value {
    json!({
        NATIVE_KEY: {
            "seconds": dt.timestamp(),
            "nanos": dt.timestamp_subsec_nanos(),
        }
    })
}

/// The current time as a stored timestamp value.
pub fn now_value() -> Value {
    to_value(Utc::now())
}

/// Decode a stored timestamp, falling back to "now".
pub fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value.and_then(decode).unwrap_or_else(Utc::now)
}

/// Like [`parse_timestamp`], but a missing or null field stays `None`.
pub fn parse_optional_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value {
        None | Some(Value::Null) => None,
        Some(v) => Some(parse_timestamp(Some(v))),
    }
}

/// Decode a value only if it is one of the recognised shapes.
pub fn decode(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(native) = value.get(NATIVE_KEY) {
        return from_parts(native.get("seconds")?, native.get("nanos"));
    }

    if let Some(s) = value.as_str() {
        return DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }

    if value.is_object() {
        let nanos = value.get("nanoseconds").or_else(|| value.get("nanos"));
        return from_parts(value.get("seconds")?, nanos);
    }

    None
}

fn from_parts(seconds: &Value, nanos: Option<&Value>) -> Option<DateTime<Utc>> {
    let seconds = seconds
        .as_i64()
        .or_else(|| seconds.as_f64().map(|s| s as i64))?;
    let nanos = nanos.and_then(Value::as_u64).unwrap_or(0) as u32;
    Utc.timestamp_opt(seconds, nanos).single()
}

/// Coarse relative-age label for a timestamp, measured against now.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    format_timestamp_at(dt, Utc::now())
}

pub fn format_timestamp_at(dt: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "Just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    locale_date(dt)
}

/// Date in the host's local time zone, month/day/year.
pub fn locale_date(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format("%-m/%-d/%Y").to_string()
}
