//! Fetch orchestrator: single-day fetches, confirmation stamps, the smart
//! probe and post-run confirmation upgrades.
//!
//! Range streaming (daily/bulk/hybrid) lives in [`super::streaming`] as a
//! second `impl CacheManager` block.
//!
//! Locking: the scan memo and physical writes are guarded by separate mutexes.
//! The memo lock is never held while taking the write lock.

use super::completeness;
use super::entry::{CachedDay, ScanMap};
use super::planner::GapPlanner;
use super::store::{CacheError, CacheStore};
use crate::clock::{Clock, SystemClock};
use crate::config::FetchConfig;
use crate::data::{DataError, FetchParams, Record, RemoteSource};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Where a day's records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySource {
    /// Served from a valid cache entry.
    Cache,
    /// Fetched remotely and written back.
    Remote,
    /// Future day outside force mode; nothing fetched.
    Skipped,
}

/// Result of [`CacheManager::fetch_day`].
#[derive(Debug, Clone, PartialEq)]
pub struct DayFetch {
    pub records: Vec<Record>,
    /// The day itself when it holds records.
    pub latest_with_records: Option<NaiveDate>,
    pub source: DaySource,
}

impl DayFetch {
    fn new(day: NaiveDate, records: Vec<Record>, source: DaySource) -> Self {
        let latest_with_records = (!records.is_empty()).then_some(day);
        Self {
            records,
            latest_with_records,
            source,
        }
    }

    fn skipped() -> Self {
        Self {
            records: Vec::new(),
            latest_with_records: None,
            source: DaySource::Skipped,
        }
    }
}

/// Summary of the store as of a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub as_of: NaiveDate,
    pub entries: usize,
    pub entries_with_records: usize,
    /// Entries valid for read on their own stamp.
    pub confirmed_entries: usize,
    pub latest_with_records: Option<NaiveDate>,
}

#[derive(Default)]
struct ScanMemo {
    /// Bumped on every write; a scan started under an older generation is not kept.
    generation: u64,
    scans: HashMap<NaiveDate, Arc<ScanMap>>,
}

/// Top-level cache/fetch coordinator.
pub struct CacheManager {
    pub(crate) source: Arc<dyn RemoteSource>,
    pub(crate) store: Arc<dyn CacheStore>,
    pub(crate) config: FetchConfig,
    pub(crate) planner: GapPlanner,
    clock: Arc<dyn Clock>,
    memo: Mutex<ScanMemo>,
    write_lock: Mutex<()>,
    /// Days fetched remotely by this instance, with whether they held records.
    session: Mutex<BTreeMap<NaiveDate, bool>>,
}

impl CacheManager {
    pub fn new(
        source: Arc<dyn RemoteSource>,
        store: Arc<dyn CacheStore>,
        config: FetchConfig,
    ) -> Self {
        Self {
            source,
            store,
            planner: GapPlanner::from_config(&config),
            config,
            clock: Arc::new(SystemClock),
            memo: Mutex::new(ScanMemo::default()),
            write_lock: Mutex::new(()),
            session: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// "Today" in the request timezone.
    pub fn exec_date(&self, params: &FetchParams) -> NaiveDate {
        self.clock.today(params.timezone)
    }

    /// Days fetched remotely by this instance, ascending.
    pub fn session_days(&self) -> Vec<NaiveDate> {
        self.session
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .copied()
            .collect()
    }

    // ---- scan memo ----

    /// Memoised store scan up to `as_of`.
    pub fn scan(&self, as_of: NaiveDate) -> Arc<ScanMap> {
        let generation = {
            let memo = self.memo.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(scan) = memo.scans.get(&as_of) {
                return Arc::clone(scan);
            }
            memo.generation
        };

        let scan = Arc::new(self.store.scan(as_of));

        let mut memo = self.memo.lock().unwrap_or_else(|p| p.into_inner());
        if memo.generation == generation {
            memo.scans.insert(as_of, Arc::clone(&scan));
        }
        scan
    }

    fn invalidate_scans(&self) {
        let mut memo = self.memo.lock().unwrap_or_else(|p| p.into_inner());
        memo.generation = memo.generation.wrapping_add(1);
        memo.scans.clear();
    }

    fn write_entry(&self, entry: &CachedDay) -> Result<(), CacheError> {
        let result = {
            let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
            self.store.write(entry)
        };
        self.invalidate_scans();
        result
    }

    // ---- single day ----

    /// Records for one day, from cache when trustworthy, otherwise remote.
    pub fn fetch_day(
        &self,
        day: NaiveDate,
        params: &FetchParams,
        force: bool,
    ) -> Result<DayFetch, DataError> {
        let exec_date = self.exec_date(params);
        if day > exec_date && !force {
            debug!(%day, %exec_date, "skipping future day");
            return Ok(DayFetch::skipped());
        }

        let cached = self.store.read(day);
        if completeness::is_valid_for_read(cached.as_ref(), day, exec_date, force) {
            if let Some(entry) = cached {
                debug!(%day, records = entry.records.len(), "cache hit");
                return Ok(DayFetch::new(day, entry.records, DaySource::Cache));
            }
        }

        info!(%day, source = self.source.name(), "fetching day");
        let records = self.source.fetch_day(day, params, None)?;
        self.persist(day, &records, exec_date);
        self.mark_fetched(day, !records.is_empty());
        Ok(DayFetch::new(day, records, DaySource::Remote))
    }

    /// Write `records` for `day`, stamped with the latest later day known to
    /// hold records.
    pub fn save_day(
        &self,
        day: NaiveDate,
        records: &[Record],
        exec_date: NaiveDate,
    ) -> Result<CachedDay, CacheError> {
        let scan = self.scan(exec_date);
        let mut entry = CachedDay::new(day, exec_date, records.to_vec());
        entry.confirmed_through = completeness::high_water_mark(&scan, day);
        self.write_entry(&entry)?;
        debug!(%day, records = records.len(), confirmed_through = ?entry.confirmed_through, "saved day");
        Ok(entry)
    }

    /// [`save_day`](Self::save_day), logging instead of failing. The fetched
    /// records are still returned; the day simply is a miss next run.
    pub(crate) fn persist(&self, day: NaiveDate, records: &[Record], exec_date: NaiveDate) {
        if let Err(e) = self.save_day(day, records, exec_date) {
            warn!(%day, location = %self.store.location(day), "cache write failed: {e}");
        }
    }

    pub(crate) fn mark_fetched(&self, day: NaiveDate, has_records: bool) {
        let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        let seen = session.entry(day).or_insert(false);
        *seen |= has_records;
    }

    // ---- smart probe ----

    /// Whether a one-record fetch past `days` could establish a confirmation
    /// stamp that is missing today.
    pub fn should_probe(&self, days: &[NaiveDate], exec_date: NaiveDate, force: bool) -> bool {
        if force {
            return false;
        }
        let Some(&max_day) = days.iter().max() else {
            return false;
        };
        if !days.iter().any(|d| *d < exec_date) {
            return false;
        }

        // Any requested day already confirmed past the range: skip the scan.
        let confirmed_beyond = days.iter().any(|&d| {
            self.store
                .read(d)
                .and_then(|e| e.confirmed_through)
                .is_some_and(|c| c > max_day)
        });
        if confirmed_beyond {
            debug!(%max_day, "probe not needed: range already confirmed");
            return false;
        }

        let scan = self.scan(exec_date);
        if completeness::high_water_mark(&scan, max_day).is_some() {
            debug!(%max_day, "probe not needed: later records cached");
            return false;
        }

        days.iter().filter(|&&d| d < exec_date).any(|&d| {
            let confirmed = scan.get(&d).and_then(|s| s.confirmed_through);
            !completeness::is_confirmed(confirmed, d)
        })
    }

    /// Fetch one record from the day after `max_day` and cache it if present.
    ///
    /// Returns the probe day when a record was found. The probe day is not
    /// added to the session: its entry holds at most one record and must not be
    /// upgraded to "complete".
    pub fn perform_probe(
        &self,
        max_day: NaiveDate,
        exec_date: NaiveDate,
        params: &FetchParams,
    ) -> Result<Option<NaiveDate>, DataError> {
        let Some(next) = max_day.succ_opt() else {
            return Ok(None);
        };
        let probe_day = next.min(exec_date);
        if probe_day == max_day {
            debug!(%probe_day, "probe skipped: probe day is the range end");
            return Ok(None);
        }

        info!(%probe_day, "probing for confirmation");
        let records = self.source.fetch_day(probe_day, params, Some(1))?;
        if records.is_empty() {
            debug!(%probe_day, "probe found no records");
            return Ok(None);
        }
        self.persist(probe_day, &records, exec_date);
        Ok(Some(probe_day))
    }

    /// Probe when [`should_probe`](Self::should_probe) says so. A failed
    /// lookahead fetch fails the whole range before any gap is fetched.
    pub(crate) fn probe_if_needed(
        &self,
        days: &[NaiveDate],
        exec_date: NaiveDate,
        params: &FetchParams,
        force: bool,
    ) -> Result<(), DataError> {
        if !self.should_probe(days, exec_date, force) {
            return Ok(());
        }
        let Some(&max_day) = days.iter().max() else {
            return Ok(());
        };
        self.perform_probe(max_day, exec_date, params)?;
        Ok(())
    }

    // ---- post-run upgrade ----

    /// Raise confirmation stamps of this session's days to the latest day
    /// known to hold records. Returns how many entries were rewritten.
    pub fn upgrade_confirmations(&self, exec_date: NaiveDate) -> usize {
        let session: Vec<(NaiveDate, bool)> = {
            let session = self.session.lock().unwrap_or_else(|p| p.into_inner());
            session.iter().map(|(d, h)| (*d, *h)).collect()
        };
        if session.is_empty() {
            return 0;
        }

        let global = completeness::global_latest_non_empty(&self.scan(exec_date));
        let fetched = session
            .iter()
            .rev()
            .find(|(_, has_records)| *has_records)
            .map(|(d, _)| *d);
        let Some(effective) = global.max(fetched) else {
            return 0;
        };

        let mut upgraded = 0;
        for (day, _) in session.into_iter().filter(|(d, _)| *d < effective) {
            let Some(mut entry) = self.store.read(day) else {
                continue;
            };
            if entry.confirmed_through.is_some_and(|c| c >= effective) {
                continue;
            }
            entry.confirmed_through = Some(effective);
            match self.write_entry(&entry) {
                Ok(()) => upgraded += 1,
                Err(e) => warn!(%day, "confirmation upgrade failed: {e}"),
            }
        }

        if upgraded > 0 {
            debug!(upgraded, %effective, "upgraded confirmations");
        }
        upgraded
    }

    // ---- status ----

    pub fn status(&self, as_of: NaiveDate) -> CacheStatus {
        let scan = self.scan(as_of);
        CacheStatus {
            as_of,
            entries: scan.len(),
            entries_with_records: scan.values().filter(|s| s.has_records).count(),
            confirmed_entries: scan
                .iter()
                .filter(|(d, s)| completeness::is_confirmed(s.confirmed_through, **d))
                .count(),
            latest_with_records: completeness::global_latest_non_empty(&scan),
        }
    }
}
