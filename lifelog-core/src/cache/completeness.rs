//! Completeness model: when a cached day can be trusted.
//!
//! A past day is trustworthy once some *later* day is known to hold records:
//! the API only returns data for a later day after everything before it has
//! landed. Each entry records that evidence as its confirmation stamp.
//! Pure functions, no I/O.

use super::entry::{CachedDay, ScanMap};
use chrono::NaiveDate;

/// Whether `entry` (the cache entry for `day`, if any) may be served as-is.
///
/// - force mode: any existing entry is accepted
/// - today: never (today is still filling up)
/// - future: never
/// - past: only with a confirmation stamp strictly after `day`
pub fn is_valid_for_read(
    entry: Option<&CachedDay>,
    day: NaiveDate,
    exec_date: NaiveDate,
    force: bool,
) -> bool {
    let Some(entry) = entry else {
        return false;
    };
    if force {
        return true;
    }
    if day >= exec_date {
        return false;
    }
    is_confirmed(entry.confirmed_through, day)
}

/// A stamp confirms `day` only when it is strictly later than `day`.
pub fn is_confirmed(confirmed_through: Option<NaiveDate>, day: NaiveDate) -> bool {
    confirmed_through.is_some_and(|c| c > day)
}

/// Latest day after `after` that holds records.
pub fn high_water_mark(scan: &ScanMap, after: NaiveDate) -> Option<NaiveDate> {
    scan.range(after.succ_opt()?..)
        .rev()
        .find(|(_, r)| r.has_records)
        .map(|(day, _)| *day)
}

/// Latest day in the whole scan that holds records.
pub fn global_latest_non_empty(scan: &ScanMap) -> Option<NaiveDate> {
    scan.iter()
        .rev()
        .find(|(_, r)| r.has_records)
        .map(|(day, _)| *day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::ScanResult;
    use crate::data::Record;
    use serde_json::json;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
    }

    fn entry(day: u32, confirmed: Option<u32>) -> CachedDay {
        let mut e = CachedDay::new(d(day), d(day), vec![]);
        e.confirmed_through = confirmed.map(d);
        e
    }

    fn scan(days: &[(u32, bool)]) -> ScanMap {
        days.iter()
            .map(|&(day, has_records)| {
                (
                    d(day),
                    ScanResult {
                        has_records,
                        confirmed_through: None,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn missing_entry_is_never_valid() {
        assert!(!is_valid_for_read(None, d(14), d(20), false));
        assert!(!is_valid_for_read(None, d(14), d(20), true));
    }

    #[test]
    fn force_accepts_any_existing_entry() {
        let e = entry(14, None);
        assert!(is_valid_for_read(Some(&e), d(14), d(20), true));
        // today and future too
        assert!(is_valid_for_read(Some(&e), d(14), d(14), true));
        assert!(is_valid_for_read(Some(&e), d(14), d(10), true));
    }

    #[test]
    fn today_is_always_refetched() {
        let e = entry(20, Some(25));
        assert!(!is_valid_for_read(Some(&e), d(20), d(20), false));
    }

    #[test]
    fn future_is_never_valid_without_force() {
        let e = entry(22, Some(25));
        assert!(!is_valid_for_read(Some(&e), d(22), d(20), false));
    }

    #[test]
    fn past_needs_strictly_later_confirmation() {
        assert!(is_valid_for_read(Some(&entry(14, Some(15))), d(14), d(20), false));
        assert!(!is_valid_for_read(Some(&entry(14, Some(14))), d(14), d(20), false));
        assert!(!is_valid_for_read(Some(&entry(14, Some(13))), d(14), d(20), false));
        assert!(!is_valid_for_read(Some(&entry(14, None)), d(14), d(20), false));
    }

    #[test]
    fn empty_records_do_not_affect_validity() {
        let mut e = entry(14, Some(19));
        assert!(is_valid_for_read(Some(&e), d(14), d(20), false));
        e.records
            .push(Record::from_value(json!({ "date": "2024-07-14" })).unwrap());
        assert!(is_valid_for_read(Some(&e), d(14), d(20), false));
    }

    #[test]
    fn high_water_mark_is_strictly_after() {
        let s = scan(&[(10, true), (14, true), (16, false), (18, true), (19, false)]);
        assert_eq!(high_water_mark(&s, d(14)), Some(d(18)));
        assert_eq!(high_water_mark(&s, d(9)), Some(d(18)));
        assert_eq!(high_water_mark(&s, d(18)), None);
        assert_eq!(high_water_mark(&ScanMap::new(), d(1)), None);
    }

    #[test]
    fn high_water_mark_ignores_empty_days() {
        let s = scan(&[(14, true), (15, false), (16, false)]);
        assert_eq!(high_water_mark(&s, d(14)), None);
    }

    #[test]
    fn global_latest_has_no_lower_bound() {
        let s = scan(&[(3, true), (5, false)]);
        assert_eq!(global_latest_non_empty(&s), Some(d(3)));
        assert_eq!(global_latest_non_empty(&scan(&[(5, false)])), None);
    }
}
