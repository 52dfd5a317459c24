//! In-memory cache store, for tests and ephemeral runs.

use super::entry::{CachedDay, ScanMap};
use super::store::{CacheError, CacheStore};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<BTreeMap<NaiveDate, CachedDay>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert entries directly, bypassing the orchestrator.
    pub fn seed(&self, entries: impl IntoIterator<Item = CachedDay>) {
        let mut map = self.entries.write().unwrap_or_else(|p| p.into_inner());
        for entry in entries {
            map.insert(entry.date, entry);
        }
    }

    pub fn reset(&self) {
        self.entries.write().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .copied()
            .collect()
    }
}

impl CacheStore for MemoryCacheStore {
    fn read(&self, day: NaiveDate) -> Option<CachedDay> {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(&day)
            .cloned()
    }

    fn write(&self, entry: &CachedDay) -> Result<(), CacheError> {
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(entry.date, entry.clone());
        Ok(())
    }

    fn scan(&self, as_of: NaiveDate) -> ScanMap {
        self.entries
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .range(..=as_of)
            .map(|(day, entry)| (*day, entry.scan_result()))
            .collect()
    }

    fn location(&self, day: NaiveDate) -> String {
        format!("memory://{}.json", day.format("%Y-%m-%d"))
    }
}
