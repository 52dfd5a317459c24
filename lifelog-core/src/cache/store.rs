//! Storage-agnostic per-day cache interface.

use super::entry::{CachedDay, ScanMap};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

/// Store write failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable key-value storage keyed by calendar day.
///
/// Implementations must publish writes atomically (a reader never observes a
/// half-written entry) and must serialise concurrent writers.
pub trait CacheStore: Send + Sync {
    /// Entry for `day`, or `None` when absent or unreadable.
    fn read(&self, day: NaiveDate) -> Option<CachedDay>;

    /// Persist `entry` under `entry.date`, replacing any previous entry.
    fn write(&self, entry: &CachedDay) -> Result<(), CacheError>;

    /// Summaries of every entry dated on or before `as_of`.
    ///
    /// May walk the whole store; callers memoise per `as_of`.
    fn scan(&self, as_of: NaiveDate) -> ScanMap;

    /// Where `day` lives, for diagnostics.
    fn location(&self, day: NaiveDate) -> String;
}
