//! Orchestrator runs against the on-disk cache, across separate manager
//! instances (one per process run).

use chrono::NaiveDate;
use lifelog_core::{
    CacheManager, CacheStore, DaySource, FetchConfig, FetchParams, FixedClock, FsCacheStore,
    InMemorySource, RangeRequest, Record,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
}

fn rec(day: u32) -> Record {
    Record::from_value(json!({
        "id": format!("log-{day}"),
        "startTime": format!("2024-07-{day:02}T09:30:00-04:00"),
        "contents": [{ "type": "heading1", "content": "standup" }],
    }))
    .unwrap()
}

fn manager(root: &Path, source: &Arc<InMemorySource>, today: NaiveDate) -> CacheManager {
    CacheManager::new(
        source.clone(),
        Arc::new(FsCacheStore::new(root)),
        FetchConfig::default(),
    )
    .with_clock(Arc::new(FixedClock(today)))
}

#[test]
fn second_run_reads_everything_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemorySource::new());
    source.seed((14..=19).map(rec).collect::<Vec<_>>());
    let today = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
    let request = RangeRequest::new(d(14), d(18));

    let first: Vec<Record> = manager(dir.path(), &source, today)
        .stream_range(&request, &FetchParams::default())
        .unwrap()
        .collect();
    assert_eq!(first.len(), 5);

    let calls = source.requests_made();
    let second: Vec<Record> = manager(dir.path(), &source, today)
        .stream_range(&request, &FetchParams::default())
        .unwrap()
        .collect();

    assert_eq!(second, first);
    assert_eq!(source.requests_made(), calls);
}

#[test]
fn on_disk_document_uses_stable_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemorySource::new());
    source.seed([rec(14), rec(16)]);
    let today = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();

    manager(dir.path(), &source, today)
        .stream_range(&RangeRequest::new(d(14), d(16)), &FetchParams::default())
        .unwrap()
        .for_each(drop);

    let raw = std::fs::read(dir.path().join("2024/07/2024-07-15.json")).unwrap();
    let doc: Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(doc["data_date"], "2024-07-15");
    assert_eq!(doc["fetched_on_date"], "2024-08-01");
    assert_eq!(doc["logs"], json!([]));
    assert_eq!(doc["confirmed_complete_up_to_date"], "2024-07-16");
}

#[test]
fn legacy_array_is_refetched_unless_forced() {
    let dir = tempfile::tempdir().unwrap();
    let month = dir.path().join("2024/07");
    std::fs::create_dir_all(&month).unwrap();
    std::fs::write(
        month.join("2024-07-14.json"),
        r#"[{"id": "legacy", "date": "2024-07-14"}]"#,
    )
    .unwrap();

    let source = Arc::new(InMemorySource::new());
    source.seed([rec(14)]);
    let m = manager(dir.path(), &source, d(25));

    let forced = m.fetch_day(d(14), &FetchParams::default(), true).unwrap();
    assert_eq!(forced.source, DaySource::Cache);
    assert_eq!(forced.records[0].id().as_deref(), Some("legacy"));
    assert_eq!(source.requests_made(), 0);

    let fresh = m.fetch_day(d(14), &FetchParams::default(), false).unwrap();
    assert_eq!(fresh.source, DaySource::Remote);
    assert_eq!(fresh.records[0].id().as_deref(), Some("log-14"));
}

#[test]
fn corrupt_file_counts_as_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let month = dir.path().join("2024/07");
    std::fs::create_dir_all(&month).unwrap();
    std::fs::write(month.join("2024-07-14.json"), "{\"data_date\": ").unwrap();

    let source = Arc::new(InMemorySource::new());
    source.seed([rec(14)]);
    let m = manager(dir.path(), &source, d(25));

    let got = m.fetch_day(d(14), &FetchParams::default(), true).unwrap();
    assert_eq!(got.source, DaySource::Remote);
    assert!(FsCacheStore::new(dir.path()).read(d(14)).is_some());
}

#[test]
fn status_reflects_disk_state() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(InMemorySource::new());
    source.seed([rec(14), rec(16)]);
    let today = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap();
    let m = manager(dir.path(), &source, today);

    m.stream_range(&RangeRequest::new(d(14), d(16)), &FetchParams::default())
        .unwrap()
        .for_each(drop);

    let status = m.status(today);
    assert_eq!(status.entries, 3);
    assert_eq!(status.entries_with_records, 2);
    assert_eq!(status.confirmed_entries, 2);
    assert_eq!(status.latest_with_records, Some(d(16)));
}
