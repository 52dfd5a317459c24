//! Limitless lifelogs HTTP source.
//!
//! Fetches lifelogs from `GET {base}/v1/lifelogs`, following
//! `meta.lifelogs.nextCursor` until the pages run out or the result cap is
//! reached. Handles 429/5xx with a short bounded retry and shares a circuit
//! breaker across requests.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, FetchParams, RemoteSource};
use super::record::Record;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.limitless.ai";

/// Lifelogs list response.
#[derive(Debug, Deserialize)]
struct LifelogsResponse {
    data: LifelogsData,
    #[serde(default)]
    meta: Option<MetaWrapper>,
}

#[derive(Debug, Deserialize)]
struct LifelogsData {
    #[serde(default)]
    lifelogs: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct MetaWrapper {
    lifelogs: Option<LifelogsMeta>,
}

#[derive(Debug, Deserialize)]
struct LifelogsMeta {
    #[serde(rename = "nextCursor")]
    next_cursor: Option<String>,
}

/// HTTP source for the lifelogs endpoint.
pub struct LimitlessSource {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl LimitlessSource {
    pub fn new(
        api_key: impl Into<String>,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, DataError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(DataError::AuthenticationRequired("API key is empty".into()));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        })
    }

    /// Point the source at another host (staging, a local fake).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/lifelogs", self.base_url)
    }

    /// Query parameters shared by day and range requests.
    ///
    /// Extra parameters go in first so the engine-controlled keys always win.
    fn base_query(params: &FetchParams) -> BTreeMap<String, String> {
        let mut query = params.extra.clone();
        query.insert("timezone".into(), params.timezone.name().to_string());
        query.insert("direction".into(), params.direction.as_str().to_string());
        query.insert("limit".into(), params.page_limit.max(1).to_string());
        query
    }

    fn day_query(day: NaiveDate, params: &FetchParams) -> BTreeMap<String, String> {
        let mut query = Self::base_query(params);
        query.remove("start");
        query.remove("end");
        query.insert("date".into(), day.format("%Y-%m-%d").to_string());
        query
    }

    fn range_query(
        start: NaiveDate,
        end: NaiveDate,
        params: &FetchParams,
    ) -> BTreeMap<String, String> {
        let mut query = Self::base_query(params);
        query.remove("date");
        query.insert("start".into(), format!("{} 00:00:00", start.format("%Y-%m-%d")));
        query.insert("end".into(), format!("{} 23:59:59", end.format("%Y-%m-%d")));
        query
    }

    /// Split a page into records and the next cursor.
    fn parse_page(resp: LifelogsResponse) -> (Vec<Record>, Option<String>) {
        let records = resp
            .data
            .lifelogs
            .into_iter()
            .filter_map(|value| {
                let record = Record::from_value(value);
                if record.is_none() {
                    debug!("skipping non-object lifelog entry");
                }
                record
            })
            .collect();

        let cursor = resp
            .meta
            .and_then(|m| m.lifelogs)
            .and_then(|m| m.next_cursor)
            .filter(|c| !c.is_empty());

        (records, cursor)
    }

    /// Walk every page of a query, stopping early once `max_results` is reached.
    fn paginate(
        &self,
        mut query: BTreeMap<String, String>,
        max_results: Option<usize>,
    ) -> Result<Vec<Record>, DataError> {
        let cap = max_results.filter(|&n| n > 0);
        if let Some(cap) = cap {
            let page = query
                .get("limit")
                .and_then(|l| l.parse::<usize>().ok())
                .unwrap_or(cap);
            query.insert("limit".into(), page.min(cap).to_string());
        }

        let mut records = Vec::new();
        loop {
            let page = self.request_with_retry(&query)?;
            let (page_records, cursor) = Self::parse_page(page);
            if page_records.is_empty() {
                break;
            }

            for record in page_records {
                if cap.is_some_and(|c| records.len() >= c) {
                    return Ok(records);
                }
                records.push(record);
            }

            match cursor {
                Some(next) if !cap.is_some_and(|c| records.len() >= c) => {
                    query.insert("cursor".into(), next);
                }
                _ => break,
            }
        }
        Ok(records)
    }

    /// Execute a single page request with retry and circuit breaker logic.
    fn request_with_retry(
        &self,
        query: &BTreeMap<String, String>,
    ) -> Result<LifelogsResponse, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }

        let url = self.endpoint();
        let mut last_error = None;
        let mut retry_after: Option<Duration> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.base_delay * 2u32.pow(attempt - 1);
                let delay = retry_after.take().map_or(backoff, |ra| ra.max(backoff));
                debug!(attempt, ?delay, "retrying lifelogs request");
                std::thread::sleep(delay);
            }

            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }

            debug!(%url, ?query, "GET");
            let sent = self
                .client
                .get(&url)
                .header("X-API-Key", &self.api_key)
                .header("Accept", "application/json")
                .query(query)
                .send();

            match sent {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::UNAUTHORIZED
                        || status == reqwest::StatusCode::FORBIDDEN
                    {
                        return Err(DataError::AuthenticationRequired(format!(
                            "API rejected the key (HTTP {status})"
                        )));
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        self.circuit_breaker.record_failure();
                        let secs = resp
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok())
                            .unwrap_or(60);
                        warn!(retry_after_secs = secs, "rate limited by lifelogs API");
                        retry_after = Some(Duration::from_secs(secs.min(60)));
                        last_error = Some(DataError::RateLimited {
                            retry_after_secs: secs,
                        });
                        continue;
                    }

                    if status.is_server_error() {
                        self.circuit_breaker.record_failure();
                        let message = resp.text().unwrap_or_default();
                        last_error = Some(DataError::Api {
                            status: status.as_u16(),
                            message,
                        });
                        continue;
                    }

                    if !status.is_success() {
                        let message = resp.text().unwrap_or_default();
                        return Err(DataError::Api {
                            status: status.as_u16(),
                            message,
                        });
                    }

                    let page: LifelogsResponse = resp.json().map_err(|e| {
                        DataError::ResponseFormatChanged(format!(
                            "failed to parse lifelogs response: {e}"
                        ))
                    })?;
                    self.circuit_breaker.record_success();
                    return Ok(page);
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        self.circuit_breaker.record_failure();
                        last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(DataError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

impl RemoteSource for LimitlessSource {
    fn name(&self) -> &str {
        "limitless_api"
    }

    fn fetch_day(
        &self,
        day: NaiveDate,
        params: &FetchParams,
        max_results: Option<usize>,
    ) -> Result<Vec<Record>, DataError> {
        self.paginate(Self::day_query(day, params), max_results)
    }

    fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        params: &FetchParams,
        max_results: Option<usize>,
    ) -> Result<Vec<Record>, DataError> {
        self.paginate(Self::range_query(start, end, params), max_results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Direction;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let cb = Arc::new(CircuitBreaker::default_api());
        assert!(matches!(
            LimitlessSource::new("  ", cb),
            Err(DataError::AuthenticationRequired(_))
        ));
    }

    #[test]
    fn day_query_sets_date_and_drops_range_keys() {
        let mut params = FetchParams::default().with_direction(Direction::Asc);
        params.extra.insert("start".into(), "bogus".into());
        params.extra.insert("includeMarkdown".into(), "false".into());
        params.extra.insert("direction".into(), "desc".into());

        let q = LimitlessSource::day_query(d(2024, 7, 14), &params);
        assert_eq!(q.get("date").map(String::as_str), Some("2024-07-14"));
        assert_eq!(q.get("direction").map(String::as_str), Some("asc"));
        assert_eq!(q.get("timezone").map(String::as_str), Some("America/Detroit"));
        assert_eq!(q.get("includeMarkdown").map(String::as_str), Some("false"));
        assert!(!q.contains_key("start"));
    }

    #[test]
    fn range_query_spans_whole_days() {
        let q = LimitlessSource::range_query(d(2024, 7, 14), d(2024, 7, 16), &FetchParams::default());
        assert_eq!(q.get("start").map(String::as_str), Some("2024-07-14 00:00:00"));
        assert_eq!(q.get("end").map(String::as_str), Some("2024-07-16 23:59:59"));
        assert!(!q.contains_key("date"));
        assert_eq!(q.get("limit").map(String::as_str), Some("10"));
    }

    #[test]
    fn parse_page_extracts_records_and_cursor() {
        let body = r#"{
            "data": { "lifelogs": [
                { "id": "a", "startTime": "2024-07-14T10:00:00Z" },
                42,
                { "id": "b", "startTime": "2024-07-14T11:00:00Z" }
            ]},
            "meta": { "lifelogs": { "nextCursor": "c2", "count": 3 } }
        }"#;
        let resp: LifelogsResponse = serde_json::from_str(body).unwrap();
        let (records, cursor) = LimitlessSource::parse_page(resp);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].id().as_deref(), Some("b"));
        assert_eq!(cursor.as_deref(), Some("c2"));
    }

    #[test]
    fn parse_page_treats_missing_or_empty_cursor_as_last_page() {
        let resp: LifelogsResponse =
            serde_json::from_str(r#"{ "data": { "lifelogs": [] } }"#).unwrap();
        let (records, cursor) = LimitlessSource::parse_page(resp);
        assert!(records.is_empty());
        assert!(cursor.is_none());

        let resp: LifelogsResponse = serde_json::from_str(
            r#"{ "data": { "lifelogs": [] }, "meta": { "lifelogs": { "nextCursor": "" } } }"#,
        )
        .unwrap();
        assert!(LimitlessSource::parse_page(resp).1.is_none());
    }

    #[test]
    fn tripped_breaker_refuses_without_network() {
        let cb = Arc::new(CircuitBreaker::default_api());
        cb.trip();
        let source = LimitlessSource::new("key", cb)
            .unwrap()
            .with_base_url("http://127.0.0.1:9/");
        let err = source
            .fetch_day(d(2024, 7, 14), &FetchParams::default(), Some(1))
            .unwrap_err();
        assert!(matches!(err, DataError::CircuitBreakerTripped));
    }
}
