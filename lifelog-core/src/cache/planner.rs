//! Gap planner for hybrid fetches.
//!
//! Partitions a date range into maximal runs of days that need a remote
//! fetch, then picks bulk or per-day fetching for each run. Bulk thresholds are
//! measured against the whole requested range, not what is left after earlier
//! gaps.

use super::completeness;
use super::entry::CachedDay;
use crate::config::FetchConfig;
use crate::data::DataError;
use chrono::NaiveDate;
use std::fmt;

/// How a gap is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GapStrategy {
    /// One range call covering the gap.
    Bulk,
    /// One call per day.
    Daily,
}

impl fmt::Display for GapStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bulk => "bulk",
            Self::Daily => "daily",
        })
    }
}

/// Inclusive run of days needing a remote fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub strategy: GapStrategy,
}

impl Gap {
    /// Inclusive day count.
    pub fn len_days(&self) -> usize {
        inclusive_days(self.start, self.end)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

impl fmt::Display for Gap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={} ({})", self.start, self.end, self.strategy)
    }
}

pub(crate) fn inclusive_days(start: NaiveDate, end: NaiveDate) -> usize {
    usize::try_from((end - start).num_days() + 1).unwrap_or(0)
}

/// Bulk-vs-daily thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GapPlanner {
    pub bulk_min_days: usize,
    pub bulk_min_ratio: f64,
}

impl Default for GapPlanner {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

impl GapPlanner {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            bulk_min_days: config.bulk_min_days,
            bulk_min_ratio: config.bulk_min_ratio,
        }
    }

    /// Plan gaps over `[start, end]`, reading cache state through `lookup`.
    ///
    /// Days after `exec_date` are never planned. Today always needs a fetch.
    pub fn plan<F>(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        exec_date: NaiveDate,
        lookup: F,
    ) -> Result<Vec<Gap>, DataError>
    where
        F: Fn(NaiveDate) -> Option<CachedDay>,
    {
        if end < start {
            return Err(DataError::InvalidRange { start, end });
        }

        let last = end.min(exec_date);
        let needs_fetch: Vec<NaiveDate> = start
            .iter_days()
            .take_while(|d| *d <= last)
            .filter(|&d| {
                d == exec_date
                    || !completeness::is_valid_for_read(lookup(d).as_ref(), d, exec_date, false)
            })
            .collect();

        Ok(self.assign(coalesce(&needs_fetch), inclusive_days(start, end)))
    }

    /// Tag each run with a strategy.
    pub fn assign(&self, runs: Vec<(NaiveDate, NaiveDate)>, total_days: usize) -> Vec<Gap> {
        let total = total_days.max(1) as f64;
        runs.into_iter()
            .map(|(start, end)| {
                let len = inclusive_days(start, end);
                let ratio = len as f64 / total;
                let strategy = if len >= self.bulk_min_days || ratio >= self.bulk_min_ratio {
                    GapStrategy::Bulk
                } else {
                    GapStrategy::Daily
                };
                Gap {
                    start,
                    end,
                    strategy,
                }
            })
            .collect()
    }
}

/// Merge ascending days into maximal contiguous `(start, end)` runs.
pub fn coalesce(days: &[NaiveDate]) -> Vec<(NaiveDate, NaiveDate)> {
    let mut runs: Vec<(NaiveDate, NaiveDate)> = Vec::new();
    for &day in days {
        match runs.last_mut() {
            Some((_, end)) if end.succ_opt() == Some(day) => *end = day,
            _ => runs.push((day, day)),
        }
    }
    runs
}
