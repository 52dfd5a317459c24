//! Remote source trait and structured error types.
//!
//! The RemoteSource trait abstracts over where lifelogs come from (the HTTP
//! API, an in-memory fixture) so the orchestrator can be driven and mocked
//! without a network. The cache layer sits above this trait; sources don't
//! know about the cache.

use super::record::Record;
use crate::config::Direction;
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::collections::BTreeMap;
use thiserror::Error;

/// Timezone used for the execution date when none is given.
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Detroit;

/// Structured error types for fetch operations.
///
/// Displayed as-is by the CLI.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by API (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("hard stop: API has refused repeated requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("invalid date range: end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("data error: {0}")]
    Other(String),
}

/// Per-call request parameters forwarded to the remote source.
#[derive(Debug, Clone)]
pub struct FetchParams {
    /// Timezone for day boundaries and the execution date.
    pub timezone: Tz,
    /// Output ordering; also forwarded to the API.
    pub direction: Direction,
    /// Page size for paginated calls.
    pub page_limit: usize,
    /// Extra query parameters passed through untouched (e.g. `includeMarkdown`).
    pub extra: BTreeMap<String, String>,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE,
            direction: Direction::Desc,
            page_limit: 10,
            extra: BTreeMap::new(),
        }
    }
}

impl FetchParams {
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// Trait for paginated lifelog sources.
///
/// `max_results` caps the number of records returned; implementations stop
/// issuing further page requests once the cap is reached. `None` means no cap.
pub trait RemoteSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch all records for one calendar day.
    fn fetch_day(
        &self,
        day: NaiveDate,
        params: &FetchParams,
        max_results: Option<usize>,
    ) -> Result<Vec<Record>, DataError>;

    /// Fetch all records for an inclusive range of days.
    fn fetch_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        params: &FetchParams,
        max_results: Option<usize>,
    ) -> Result<Vec<Record>, DataError>;
}
