//! Cached day records and their on-disk JSON shape.
//!
//! Current format, one document per day:
//!
//! ```json
//! {
//!   "data_date": "2024-07-14",
//!   "fetched_on_date": "2024-07-20",
//!   "logs": [ ... ],
//!   "confirmed_complete_up_to_date": "2024-07-19"
//! }
//! ```
//!
//! Older caches stored a bare JSON array of records; those still load, with
//! no confirmation stamp.

use crate::data::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One calendar day's cached state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDay {
    /// The day the records belong to.
    #[serde(rename = "data_date")]
    pub date: NaiveDate,

    /// When the entry was written. Informational only.
    #[serde(rename = "fetched_on_date")]
    pub fetched_on: NaiveDate,

    /// Records for the day. Empty means "confirmed no events", not "unknown".
    #[serde(rename = "logs", default, deserialize_with = "null_as_empty")]
    pub records: Vec<Record>,

    /// Latest date known to hold records when this entry was written.
    /// The entry is trustworthy for its own day only when this is strictly later.
    #[serde(rename = "confirmed_complete_up_to_date", default)]
    pub confirmed_through: Option<NaiveDate>,
}

impl CachedDay {
    pub fn new(date: NaiveDate, fetched_on: NaiveDate, records: Vec<Record>) -> Self {
        Self {
            date,
            fetched_on,
            records,
            confirmed_through: None,
        }
    }

    pub fn confirmed(mut self, through: NaiveDate) -> Self {
        self.confirmed_through = Some(through);
        self
    }

    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }

    pub fn scan_result(&self) -> ScanResult {
        ScanResult {
            has_records: self.has_records(),
            confirmed_through: self.confirmed_through,
        }
    }

    /// Decode a stored document, accepting the legacy bare-array shape.
    ///
    /// `day` is the key the document was stored under; legacy documents carry
    /// no dates of their own and take it for both date fields.
    pub fn from_json(day: NaiveDate, bytes: &[u8]) -> Result<Self, serde_json::Error> {
        match serde_json::from_slice::<StoredDay>(bytes)? {
            StoredDay::Current(entry) => Ok(entry),
            StoredDay::Legacy(records) => Ok(Self::new(day, day, records)),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDay {
    Current(CachedDay),
    Legacy(Vec<Record>),
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Record>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Record>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Per-day summary used for planning and confirmation stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    pub has_records: bool,
    pub confirmed_through: Option<NaiveDate>,
}

/// Scan output keyed by day, ascending.
pub type ScanMap = BTreeMap<NaiveDate, ScanResult>;
