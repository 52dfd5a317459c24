//! Per-day cache, completeness model, gap planning and the fetch orchestrator.

pub mod completeness;
pub mod entry;
pub mod filesystem;
pub mod manager;
pub mod memory;
pub mod planner;
pub mod store;
pub mod streaming;

pub use entry::{CachedDay, ScanMap, ScanResult};
pub use filesystem::FsCacheStore;
pub use manager::{CacheManager, CacheStatus, DayFetch, DaySource};
pub use memory::MemoryCacheStore;
pub use planner::{Gap, GapPlanner, GapStrategy};
pub use store::{CacheError, CacheStore};
pub use streaming::{RangeRequest, RecordStream};
