use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;

pub const ASSISTANT_RECORD_TYPE: &str = "assistant";

/// Candidate id fields, in priority order.
const ID_FIELDS: [&str; 2] = ["uuid", "requestId"];

/// One assistant-authored line of a conversation log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub record_type: String,
    pub id: String,
    /// Wall-clock time in the record's own UTC offset.
    pub timestamp: Option<NaiveDateTime>,
    pub text_segments: Vec<String>,
}

impl LogRecord {
    /// Parses one JSONL line. Anything that is not a well-formed assistant
    /// record with an id yields `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let value: Value = serde_json::from_str(line).ok()?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;

        let record_type = object.get("type").and_then(Value::as_str)?;
        if record_type != ASSISTANT_RECORD_TYPE {
            return None;
        }

        let id = ID_FIELDS
            .iter()
            .find_map(|key| object.get(*key).and_then(id_from_value))?;

        let timestamp = object
            .get("timestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp);

        let text_segments = object
            .get("message")
            .and_then(|message| message.get("content"))
            .and_then(Value::as_array)
            .map(|content| content.iter().filter_map(text_segment).collect())
            .unwrap_or_default();

        Some(Self {
            record_type: record_type.to_string(),
            id,
            timestamp,
            text_segments,
        })
    }

    /// All text blocks of the message joined by newlines.
    pub fn text(&self) -> String {
        self.text_segments.join("\n")
    }

    pub fn date_or(&self, fallback: NaiveDate) -> NaiveDate {
        self.timestamp
            .map(|timestamp| timestamp.date())
            .unwrap_or(fallback)
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.timestamp.map(|timestamp| timestamp.time())
    }
}

fn id_from_value(value: &Value) -> Option<String> {
    if let Some(id) = value.as_str() {
        let id = id.trim();
        if !id.is_empty() {
            return Some(id.to_string());
        }
        return None;
    }
    if let Some(id) = value.as_i64() {
        return Some(id.to_string());
    }
    value.as_u64().map(|id| id.to_string())
}

fn text_segment(item: &Value) -> Option<String> {
    let item = item.as_object()?;
    if item.get("type").and_then(Value::as_str) != Some("text") {
        return None;
    }
    item.get("text")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Parses an ISO-8601 timestamp into the wall-clock time of its own offset.
///
/// A trailing `Z` is rewritten to `+00:00` first. Basic-format offsets such
/// as `+0530` are accepted too. Offset-less datetimes and bare dates are taken as already being in the record's calendar.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let normalized = match value.strip_suffix('Z') {
        Some(rest) => format!("{rest}+00:00"),
        None => value.to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(parsed.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(parsed) = DateTime::parse_from_str(&normalized, format) {
            return Some(parsed.naive_local());
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(&normalized, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
