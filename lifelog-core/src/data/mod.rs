//! Remote data sources and the record model

pub mod circuit_breaker;
pub mod http;
pub mod in_memory;
pub mod provider;
pub mod record;

pub use circuit_breaker::CircuitBreaker;
pub use http::LimitlessSource;
pub use in_memory::{InMemorySource, RemoteRequest};
pub use provider::{DataError, FetchParams, RemoteSource, DEFAULT_TIMEZONE};
pub use record::Record;
