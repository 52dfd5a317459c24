//! Lifelog core: per-day cache, completeness model, gap planner, fetch orchestrator.
//!
//! This crate contains the cache-validity engine for the lifelogs API:
//! - Opaque record model with day derivation
//! - Remote source trait (HTTP, in-memory)
//! - Per-day cache store trait with filesystem and in-memory backends
//! - Completeness model (confirmation stamps, high-water marks)
//! - Gap planner that partitions a range into bulk/daily fetches
//! - Fetch orchestrator with daily, bulk and hybrid strategies, smart probe,
//!   and post-run confirmation upgrades

pub mod cache;
pub mod clock;
pub mod config;
pub mod data;

pub use cache::{
    CacheManager, CacheStatus, CacheStore, CachedDay, DayFetch, DaySource, FsCacheStore, Gap,
    GapPlanner, GapStrategy, MemoryCacheStore, RangeRequest, RecordStream, ScanResult,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, Direction, FetchConfig, FetchStrategy};
pub use data::{DataError, FetchParams, InMemorySource, LimitlessSource, Record, RemoteSource};
