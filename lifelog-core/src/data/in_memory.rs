//! In-memory lifelogs source for deterministic tests.
//!
//! Filters a seeded record list by day or range, orders it by direction,
//! applies the result cap, and logs every request so tests can assert on
//! remote traffic.

use super::provider::{DataError, FetchParams, RemoteSource};
use super::record::Record;
use crate::config::Direction;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

/// One call made against the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRequest {
    Day {
        day: NaiveDate,
        max_results: Option<usize>,
    },
    Range {
        start: NaiveDate,
        end: NaiveDate,
        max_results: Option<usize>,
    },
}

#[derive(Debug, Default)]
pub struct InMemorySource {
    records: RwLock<Vec<Record>>,
    requests: Mutex<Vec<RemoteRequest>>,
    offline: AtomicBool,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add records to the simulated API.
    pub fn seed(&self, records: impl IntoIterator<Item = Record>) {
        self.records
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .extend(records);
    }

    /// Drop all records and the request log.
    pub fn reset(&self) {
        self.records.write().unwrap_or_else(|p| p.into_inner()).clear();
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// While offline every request fails with `NetworkUnreachable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn requests_made(&self) -> usize {
        self.requests.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn log(&self, request: RemoteRequest) -> Result<(), DataError> {
        self.requests
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(request);
        if self.offline.load(Ordering::SeqCst) {
            return Err(DataError::NetworkUnreachable("simulated outage".into()));
        }
        Ok(())
    }

    fn select(
        &self,
        keep: impl Fn(NaiveDate) -> bool,
        params: &FetchParams,
        max_results: Option<usize>,
    ) -> Vec<Record> {
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        let mut subset: Vec<Record> = records
            .iter()
            .filter(|r| r.day().is_some_and(&keep))
            .cloned()
            .collect();

        // Stable sort keeps seed order within a timestamp.
        subset.sort_by(|a, b| a.day_field().cmp(&b.day_field()));
        if params.direction == Direction::Desc {
            subset.reverse();
        }

        if let Some(cap) = max_results.filter(|&n| n > 0) {
            subset.truncate(cap);
        }
        subset
    }
}

impl RemoteSource for InMemorySource {
    fn name(&self) -> &str {
        "in_memory"
    }

    fn fetch_day(
        &self,
        day: NaiveDate,
        params: &FetchParams,
        max_results: Option<usize>,
    ) -> Result<Vec<Record>, DataError> {
        self.log(RemoteRequest::Day { day, max_results })?;
        Ok(self.select(|d| d == day, params, max_results))
    }

    fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        params: &FetchParams,
        max_results: Option<usize>,
    ) -> Result<Vec<Record>, DataError> {
        self.log(RemoteRequest::Range {
            start,
            end,
            max_results,
        })?;
        Ok(self.select(|d| d >= start && d <= end, params, max_results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    fn log(id: u32, date: &str) -> Record {
        Record::from_value(json!({ "id": id, "date": date })).unwrap()
    }

    fn seeded() -> InMemorySource {
        let source = InMemorySource::new();
        source.seed([
            log(1, "2024-07-14"),
            log(2, "2024-07-15"),
            log(3, "2024-07-15"),
            log(4, "2024-07-16"),
        ]);
        source
    }

    #[test]
    fn day_fetch_filters_and_logs() {
        let source = seeded();
        let got = source.fetch_day(d(15), &FetchParams::default(), None).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(
            source.requests(),
            vec![RemoteRequest::Day {
                day: d(15),
                max_results: None
            }]
        );
    }

    #[test]
    fn range_fetch_orders_by_direction() {
        let source = seeded();
        let asc = FetchParams::default().with_direction(Direction::Asc);
        let got = source.fetch_range(d(14), d(16), &asc, None).unwrap();
        let ids: Vec<_> = got.iter().filter_map(Record::id).collect();
        assert_eq!(ids, vec!["1", "2", "3", "4"]);

        let got = source
            .fetch_range(d(14), d(16), &FetchParams::default(), None)
            .unwrap();
        assert_eq!(got.first().and_then(Record::id).as_deref(), Some("4"));
    }

    #[test]
    fn cap_limits_results() {
        let source = seeded();
        let got = source
            .fetch_range(d(14), d(16), &FetchParams::default(), Some(1))
            .unwrap();
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn offline_fails_but_still_counts() {
        let source = seeded();
        source.set_offline(true);
        assert!(matches!(
            source.fetch_day(d(14), &FetchParams::default(), None),
            Err(DataError::NetworkUnreachable(_))
        ));
        assert_eq!(source.requests_made(), 1);

        source.reset();
        assert_eq!(source.requests_made(), 0);
    }
}
