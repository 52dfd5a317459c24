//! Execution-date source.
//!
//! "Today" drives every validity decision (today is always refetched, future
//! days are skipped), so it is injected rather than read ad hoc.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

pub trait Clock: Send + Sync {
    /// Current calendar date in the given timezone.
    fn today(&self, tz: Tz) -> NaiveDate;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self, tz: Tz) -> NaiveDate {
        Utc::now().with_timezone(&tz).date_naive()
    }
}

/// A clock pinned to one date, whatever the timezone.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self, _tz: Tz) -> NaiveDate {
        self.0
    }
}
