//! Opaque lifelog record.
//!
//! The API's record shape is only partially specified, so records are kept as
//! a JSON object and passed through unchanged. The only structure the engine
//! relies on is the calendar day a record belongs to.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields consulted, in priority order, to derive a record's calendar day.
pub const DAY_FIELDS: [&str; 4] = ["date", "created_at", "timestamp", "startTime"];

/// A single lifelog record as returned by the remote source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Build a record from a JSON value. Returns `None` for non-objects.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// The record's `id` field rendered as a string, if present.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// The raw date/timestamp string used for day derivation: the first
    /// non-empty string among [`DAY_FIELDS`].
    pub fn day_field(&self) -> Option<&str> {
        DAY_FIELDS.iter().find_map(|key| match self.0.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        })
    }

    /// Calendar day this record belongs to.
    ///
    /// Uses the leading `YYYY-MM-DD` of the first populated day field, so a
    /// local timestamp like `2024-07-14T23:30:00-04:00` maps to 2024-07-14.
    pub fn day(&self) -> Option<NaiveDate> {
        let raw = self.day_field()?;
        let head = raw.get(..10)?;
        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
    }
}
