//! Range streaming: daily, bulk and hybrid strategies.
//!
//! Every strategy buffers complete day buckets before anything is yielded;
//! the returned [`RecordStream`] is an iterator over an already-ordered
//! buffer, not an incremental feed. Caller latency is the slowest gap plus the
//! merge.

use super::manager::CacheManager;
use super::planner::{Gap, GapStrategy};
use crate::config::{Direction, FetchStrategy};
use crate::data::{DataError, FetchParams, Record};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

type DayBuckets = BTreeMap<NaiveDate, Vec<Record>>;

/// A range query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Cap on emitted records; 0 means unlimited.
    pub max_results: usize,
    /// Accept any existing cache entry and fetch only missing days.
    pub force_cache: bool,
    /// Concurrent gap workers; `None` uses the configured limit.
    pub parallelism: Option<usize>,
}

impl RangeRequest {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            max_results: 0,
            force_cache: false,
            parallelism: None,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_force_cache(mut self, force_cache: bool) -> Self {
        self.force_cache = force_cache;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }
}

/// Ordered, capped records of a finished range fetch.
#[derive(Debug)]
pub struct RecordStream {
    inner: std::vec::IntoIter<Record>,
}

impl RecordStream {
    pub fn empty() -> Self {
        Self {
            inner: Vec::new().into_iter(),
        }
    }

    /// Concatenate day buckets in `direction` order, keeping each day's source
    /// order, then truncate to `max_results` when it is non-zero.
    fn from_buckets(buckets: DayBuckets, direction: Direction, max_results: usize) -> Self {
        let days: Box<dyn Iterator<Item = Vec<Record>>> = match direction {
            Direction::Asc => Box::new(buckets.into_values()),
            Direction::Desc => Box::new(buckets.into_values().rev()),
        };
        let mut records: Vec<Record> = days.flatten().collect();
        if max_results > 0 {
            records.truncate(max_results);
        }
        Self {
            inner: records.into_iter(),
        }
    }
}

impl Iterator for RecordStream {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for RecordStream {}

fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

impl CacheManager {
    /// Fetch `[start, end]` with the configured strategy and return its
    /// records ordered by `params.direction`.
    ///
    /// Remote failures abort the whole range. Store write failures are logged
    /// and do not.
    pub fn stream_range(
        &self,
        request: &RangeRequest,
        params: &FetchParams,
    ) -> Result<RecordStream, DataError> {
        if request.end < request.start {
            return Err(DataError::InvalidRange {
                start: request.start,
                end: request.end,
            });
        }

        let exec_date = self.exec_date(params);
        let strategy = self.config.effective_strategy(request.force_cache);
        info!(
            start = %request.start,
            end = %request.end,
            %exec_date,
            %strategy,
            force = request.force_cache,
            "streaming range"
        );

        let buckets = match strategy {
            FetchStrategy::Daily => self.stream_daily(request, params, exec_date)?,
            FetchStrategy::Bulk => self.stream_bulk(request, params, exec_date)?,
            FetchStrategy::Hybrid => self.stream_hybrid(request, params, exec_date)?,
        };

        self.upgrade_confirmations(exec_date);
        Ok(RecordStream::from_buckets(
            buckets,
            params.direction,
            request.max_results,
        ))
    }

    fn stream_daily(
        &self,
        request: &RangeRequest,
        params: &FetchParams,
        exec_date: NaiveDate,
    ) -> Result<DayBuckets, DataError> {
        let end = if request.force_cache {
            request.end
        } else {
            request.end.min(exec_date)
        };
        let days = days_between(request.start, end);
        if days.is_empty() {
            return Ok(DayBuckets::new());
        }

        self.probe_if_needed(&days, exec_date, params, request.force_cache)?;

        let mut buckets = DayBuckets::new();
        for &day in days.iter().rev() {
            let fetched = self.fetch_day(day, params, request.force_cache)?;
            buckets.insert(day, fetched.records);
        }
        Ok(buckets)
    }

    fn stream_bulk(
        &self,
        request: &RangeRequest,
        params: &FetchParams,
        exec_date: NaiveDate,
    ) -> Result<DayBuckets, DataError> {
        let end = request.end.min(exec_date);
        if request.start > end {
            debug!(start = %request.start, %exec_date, "range starts in the future");
            return Ok(DayBuckets::new());
        }
        self.fetch_range_and_save(request.start, end, params, exec_date)
    }

    fn stream_hybrid(
        &self,
        request: &RangeRequest,
        params: &FetchParams,
        exec_date: NaiveDate,
    ) -> Result<DayBuckets, DataError> {
        let end = request.end.min(exec_date);
        if request.start > end {
            debug!(start = %request.start, %exec_date, "range starts in the future");
            return Ok(DayBuckets::new());
        }
        let days = days_between(request.start, end);

        self.probe_if_needed(&days, exec_date, params, false)?;

        let gaps = self
            .planner
            .plan(request.start, end, exec_date, |d| self.store.read(d))?;
        debug!(
            gaps = gaps.len(),
            plan = %gaps.iter().map(Gap::to_string).collect::<Vec<_>>().join(", "),
            "planned gaps"
        );

        let mut buckets = if gaps.is_empty() {
            DayBuckets::new()
        } else {
            self.execute_gaps(&gaps, params, exec_date, request.parallelism)?
        };

        // Days outside every gap are valid in cache.
        for day in days {
            if gaps.iter().any(|g| g.contains(day)) {
                continue;
            }
            let records = self.store.read(day).map(|e| e.records).unwrap_or_default();
            buckets.insert(day, records);
        }
        Ok(buckets)
    }

    /// Run every gap; more than one gap runs on a private pool.
    fn execute_gaps(
        &self,
        gaps: &[Gap],
        params: &FetchParams,
        exec_date: NaiveDate,
        parallelism: Option<usize>,
    ) -> Result<DayBuckets, DataError> {
        if let [gap] = gaps {
            return self.execute_gap(gap, params, exec_date);
        }

        let workers = parallelism
            .unwrap_or(self.config.max_workers)
            .clamp(1, gaps.len());
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("lifelog-gap-{i}"))
            .build()
            .map_err(|e| DataError::WorkerPool(e.to_string()))?;

        let merged = Mutex::new(DayBuckets::new());
        pool.install(|| {
            gaps.par_iter().try_for_each(|gap| {
                let buckets = self.execute_gap(gap, params, exec_date)?;
                merged
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .extend(buckets);
                Ok::<(), DataError>(())
            })
        })?;

        Ok(merged.into_inner().unwrap_or_else(|p| p.into_inner()))
    }

    fn execute_gap(
        &self,
        gap: &Gap,
        params: &FetchParams,
        exec_date: NaiveDate,
    ) -> Result<DayBuckets, DataError> {
        debug!(%gap, "executing gap");
        match gap.strategy {
            GapStrategy::Bulk => self.fetch_range_and_save(gap.start, gap.end, params, exec_date),
            GapStrategy::Daily => {
                let mut buckets = DayBuckets::new();
                for day in gap.days().collect::<Vec<_>>().into_iter().rev() {
                    let fetched = self.fetch_day(day, params, false)?;
                    buckets.insert(day, fetched.records);
                }
                Ok(buckets)
            }
        }
    }

    /// One uncapped range call, grouped by each record's own day and saved for
    /// every day in the range, empty days included.
    fn fetch_range_and_save(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        params: &FetchParams,
        exec_date: NaiveDate,
    ) -> Result<DayBuckets, DataError> {
        info!(%start, %end, source = self.source.name(), "fetching range");
        let records = self.source.fetch_range(start, end, params, None)?;

        let mut grouped = DayBuckets::new();
        let mut stray = 0usize;
        for record in records {
            match record.day() {
                Some(day) if day >= start && day <= end => {
                    grouped.entry(day).or_default().push(record)
                }
                _ => stray += 1,
            }
        }
        if stray > 0 {
            warn!(%start, %end, stray, "dropped records outside the requested days");
        }

        // Latest first, so each save sees the later days already written.
        let mut buckets = DayBuckets::new();
        for day in days_between(start, end).into_iter().rev() {
            let records = grouped.remove(&day).unwrap_or_default();
            self.persist(day, &records, exec_date);
            self.mark_fetched(day, !records.is_empty());
            buckets.insert(day, records);
        }
        Ok(buckets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    fn rec(id: &str) -> Record {
        Record::from_value(json!({ "id": id })).unwrap()
    }

    fn buckets() -> DayBuckets {
        DayBuckets::from([
            (d(14), vec![rec("14a"), rec("14b")]),
            (d(15), vec![]),
            (d(16), vec![rec("16a")]),
        ])
    }

    fn ids(stream: RecordStream) -> Vec<String> {
        stream.filter_map(|r| r.id()).collect()
    }

    #[test]
    fn ascending_keeps_day_order_and_source_order() {
        let stream = RecordStream::from_buckets(buckets(), Direction::Asc, 0);
        assert_eq!(ids(stream), vec!["14a", "14b", "16a"]);
    }

    #[test]
    fn descending_reverses_days_only() {
        let stream = RecordStream::from_buckets(buckets(), Direction::Desc, 0);
        assert_eq!(ids(stream), vec!["16a", "14a", "14b"]);
    }

    #[test]
    fn max_results_truncates_after_ordering() {
        let stream = RecordStream::from_buckets(buckets(), Direction::Desc, 2);
        assert_eq!(stream.len(), 2);
        assert_eq!(ids(stream), vec!["16a", "14a"]);
    }

    #[test]
    fn empty_stream_yields_nothing() {
        assert_eq!(RecordStream::empty().count(), 0);
    }

    #[test]
    fn range_request_builders() {
        let req = RangeRequest::new(d(1), d(2))
            .with_max_results(5)
            .with_force_cache(true)
            .with_parallelism(2);
        assert_eq!(req.max_results, 5);
        assert!(req.force_cache);
        assert_eq!(req.parallelism, Some(2));
    }
}
