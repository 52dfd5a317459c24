//! Fetch configuration.
//!
//! Everything the orchestrator needs to choose and tune a strategy is carried
//! in a [`FetchConfig`] value handed to the constructor. The core never reads
//! environment variables; the CLI folds those into the config before use.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Global range-fetch strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Plan gaps against the cache and fetch each with bulk or per-day calls.
    #[default]
    #[serde(alias = "HYBRID")]
    Hybrid,
    /// One remote call per uncached day.
    #[serde(alias = "PER_DAY", alias = "per_day")]
    Daily,
    /// One range-parameterised remote call for the whole range.
    #[serde(alias = "BULK")]
    Bulk,
}

impl FromStr for FetchStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "daily" | "per_day" | "per-day" => Ok(Self::Daily),
            "bulk" => Ok(Self::Bulk),
            other => Err(ConfigError::Invalid(format!("unknown fetch strategy '{other}'"))),
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hybrid => "hybrid",
            Self::Daily => "daily",
            Self::Bulk => "bulk",
        })
    }
}

/// Output (and request) ordering by day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl FromStr for Direction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(ConfigError::Invalid(format!("unknown direction '{other}'"))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Strategy selection and tuning for range fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Default range strategy.
    pub strategy: FetchStrategy,

    /// Explicit override: always use bulk range pagination (outside force-cache mode).
    pub bulk_range_pagination: bool,

    /// A gap at least this many days long is fetched in bulk.
    pub bulk_min_days: usize,

    /// A gap covering at least this share of the requested range is fetched in bulk.
    pub bulk_min_ratio: f64,

    /// Worker limit for concurrent hybrid gaps.
    pub max_workers: usize,

    /// Page size requested from the remote source.
    pub page_limit: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            strategy: FetchStrategy::Hybrid,
            bulk_range_pagination: false,
            bulk_min_days: 3,
            bulk_min_ratio: 0.4,
            max_workers: 3,
            page_limit: 10,
        }
    }
}

impl FetchConfig {
    /// Load config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from a TOML string. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bulk_min_days == 0 {
            return Err(ConfigError::Invalid("bulk_min_days must be at least 1".into()));
        }
        if !(self.bulk_min_ratio.is_finite() && self.bulk_min_ratio > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "bulk_min_ratio must be a positive number, got {}",
                self.bulk_min_ratio
            )));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.page_limit == 0 {
            return Err(ConfigError::Invalid("page_limit must be at least 1".into()));
        }
        Ok(())
    }

    /// Strategy actually used for a range request.
    ///
    /// Force-cache mode always runs daily: it never issues bulk or hybrid remote calls.
    pub fn effective_strategy(&self, force_cache: bool) -> FetchStrategy {
        if force_cache {
            return FetchStrategy::Daily;
        }
        if self.bulk_range_pagination {
            return FetchStrategy::Bulk;
        }
        self.strategy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let c = FetchConfig::default();
        assert_eq!(c.strategy, FetchStrategy::Hybrid);
        assert_eq!(c.bulk_min_days, 3);
        assert_eq!(c.bulk_min_ratio, 0.4);
        assert_eq!(c.max_workers, 3);
        assert!(!c.bulk_range_pagination);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = FetchConfig::from_toml("strategy = \"daily\"\nmax_workers = 5\n").unwrap();
        assert_eq!(c.strategy, FetchStrategy::Daily);
        assert_eq!(c.max_workers, 5);
        assert_eq!(c.bulk_min_days, 3);
    }

    #[test]
    fn legacy_strategy_names_parse() {
        let c = FetchConfig::from_toml("strategy = \"PER_DAY\"").unwrap();
        assert_eq!(c.strategy, FetchStrategy::Daily);
        let c = FetchConfig::from_toml("strategy = \"BULK\"").unwrap();
        assert_eq!(c.strategy, FetchStrategy::Bulk);
        assert_eq!("HYBRID".parse::<FetchStrategy>().unwrap(), FetchStrategy::Hybrid);
        assert!("sometimes".parse::<FetchStrategy>().is_err());
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(FetchConfig::from_toml("max_workers = 0").is_err());
        assert!(FetchConfig::from_toml("bulk_min_days = 0").is_err());
        assert!(FetchConfig::from_toml("bulk_min_ratio = -1.0").is_err());
        assert!(FetchConfig::from_toml("strategy = 3").is_err());
    }

    #[test]
    fn force_cache_always_runs_daily() {
        let mut c = FetchConfig {
            bulk_range_pagination: true,
            ..FetchConfig::default()
        };
        assert_eq!(c.effective_strategy(false), FetchStrategy::Bulk);
        assert_eq!(c.effective_strategy(true), FetchStrategy::Daily);

        c.bulk_range_pagination = false;
        assert_eq!(c.effective_strategy(false), FetchStrategy::Hybrid);
        assert_eq!(c.effective_strategy(true), FetchStrategy::Daily);
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("ASC".parse::<Direction>().unwrap(), Direction::Asc);
        assert_eq!(Direction::default(), Direction::Desc);
        assert!("up".parse::<Direction>().is_err());
    }
}
