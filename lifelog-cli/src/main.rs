//! Lifelogs CLI: cached range and day fetches, cache inspection.
//!
//! Commands:
//! - `range`: stream lifelogs for an inclusive date range
//! - `day`: lifelogs for one day (`YYYY-MM-DD`, `today`, `yesterday`, `d-N`)
//! - `cache status`: entry counts and the latest day holding records
//!
//! Records go to stdout as JSON lines; logs go to stderr.

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{ArgAction, Parser, Subcommand};
use lifelog_core::data::{CircuitBreaker, DEFAULT_TIMEZONE};
use lifelog_core::{
    CacheManager, Clock, Direction, FetchConfig, FetchParams, FetchStrategy, FsCacheStore,
    InMemorySource, LimitlessSource, RangeRequest, Record, RemoteSource, SystemClock,
};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lifelogs", about = "Lifelogs CLI: cached fetches from the lifelogs API")]
struct Cli {
    /// Debug logging to stderr.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// TOML file with fetch settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory. Defaults to ~/.limitless/cache.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Timezone for day boundaries (IANA name).
    #[arg(long, global = true)]
    timezone: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct FetchArgs {
    /// Serve any cached day as-is; only missing days go remote.
    #[arg(short, long, default_value_t = false)]
    force_cache: bool,

    /// Maximum number of records to print (0 = no limit).
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Day ordering: asc or desc.
    #[arg(long, default_value = "desc")]
    direction: Direction,

    /// Include markdown in returned records.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    include_markdown: bool,

    /// Include headings in returned records.
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    include_headings: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream lifelogs for an inclusive date range.
    Range {
        /// First day (YYYY-MM-DD).
        start: String,

        /// Last day (YYYY-MM-DD).
        end: String,

        /// Gaps fetched concurrently. Defaults to the configured worker limit.
        #[arg(short, long)]
        parallel: Option<usize>,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Lifelogs for a single day.
    Day {
        /// YYYY-MM-DD, today, yesterday, or d-N (N days ago).
        when: String,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report entry counts and the latest day holding records.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let timezone = parse_timezone(cli.timezone.as_deref())?;
    let config = load_config(cli.config.as_ref())?;
    let cache_dir = match cli.cache_dir {
        Some(dir) => dir,
        None => default_cache_dir()?,
    };

    match cli.command {
        Commands::Range {
            start,
            end,
            parallel,
            fetch,
        } => run_range(&start, &end, parallel, &fetch, config, cache_dir, timezone),
        Commands::Day { when, fetch } => run_day(&when, &fetch, config, cache_dir, timezone),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(config, cache_dir, timezone),
        },
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn parse_timezone(name: Option<&str>) -> Result<Tz> {
    match name {
        None => Ok(DEFAULT_TIMEZONE),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|e| anyhow!("unknown timezone '{name}': {e}")),
    }
}

/// Config file (or defaults), then environment overrides.
fn load_config(path: Option<&PathBuf>) -> Result<FetchConfig> {
    let mut config = match path {
        Some(path) => FetchConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => FetchConfig::default(),
    };

    if let Ok(strategy) = std::env::var("FETCH_STRATEGY") {
        if !strategy.trim().is_empty() {
            config.strategy = strategy.parse::<FetchStrategy>()?;
        }
    }
    if let Ok(flag) = std::env::var("USE_BULK_RANGE_PAGINATION") {
        config.bulk_range_pagination = matches!(
            flag.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        );
    }

    config.validate()?;
    Ok(config)
}

fn default_cache_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("cannot determine home directory; pass --cache-dir")?;
    Ok(home.join(".limitless").join("cache"))
}

fn remote_source() -> Result<Arc<dyn RemoteSource>> {
    let api_key = std::env::var("LIMITLESS_API_KEY").unwrap_or_default();
    if api_key.trim().is_empty() {
        bail!("LIMITLESS_API_KEY is not set");
    }
    let circuit_breaker = Arc::new(CircuitBreaker::default_api());
    let mut source = LimitlessSource::new(api_key, circuit_breaker)?;
    if let Ok(base_url) = std::env::var("LIMITLESS_API_URL") {
        if !base_url.trim().is_empty() {
            source = source.with_base_url(base_url);
        }
    }
    Ok(Arc::new(source))
}

fn build_manager(
    source: Arc<dyn RemoteSource>,
    config: FetchConfig,
    cache_dir: PathBuf,
) -> CacheManager {
    CacheManager::new(source, Arc::new(FsCacheStore::new(cache_dir)), config)
}

fn fetch_params(fetch: &FetchArgs, config: &FetchConfig, timezone: Tz) -> FetchParams {
    let mut params = FetchParams::default()
        .with_timezone(timezone)
        .with_direction(fetch.direction);
    params.page_limit = config.page_limit;
    params
        .extra
        .insert("includeMarkdown".into(), fetch.include_markdown.to_string());
    params
        .extra
        .insert("includeHeadings".into(), fetch.include_headings.to_string());
    params
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{s}' (expected YYYY-MM-DD)"))
}

/// `YYYY-MM-DD`, `today`, `yesterday`, or `d-N`.
fn parse_day_arg(when: &str, today: NaiveDate) -> Result<NaiveDate> {
    let when = when.trim().to_ascii_lowercase();
    let back = |days: u64| {
        today
            .checked_sub_days(chrono::Days::new(days))
            .ok_or_else(|| anyhow!("date out of range: {days} days before {today}"))
    };
    match when.as_str() {
        "today" | "d-0" => Ok(today),
        "yesterday" => back(1),
        s if s.starts_with("d-") => {
            let days: u64 = s[2..]
                .parse()
                .with_context(|| format!("invalid relative day '{s}'"))?;
            back(days)
        }
        s => parse_date(s),
    }
}

fn write_records(records: impl Iterator<Item = Record>) -> Result<usize> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut count = 0;
    for record in records {
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}

fn run_range(
    start: &str,
    end: &str,
    parallel: Option<usize>,
    fetch: &FetchArgs,
    config: FetchConfig,
    cache_dir: PathBuf,
    timezone: Tz,
) -> Result<()> {
    let start = parse_date(start)?;
    let end = parse_date(end)?;
    if end < start {
        bail!("end {end} is before start {start}");
    }

    let params = fetch_params(fetch, &config, timezone);
    let manager = build_manager(remote_source()?, config, cache_dir);

    let mut request = RangeRequest::new(start, end)
        .with_max_results(fetch.limit)
        .with_force_cache(fetch.force_cache);
    if let Some(parallel) = parallel {
        request = request.with_parallelism(parallel.max(1));
    }

    let stream = manager.stream_range(&request, &params)?;
    let count = write_records(stream)?;
    tracing::info!(count, %start, %end, "range complete");
    Ok(())
}

fn run_day(
    when: &str,
    fetch: &FetchArgs,
    config: FetchConfig,
    cache_dir: PathBuf,
    timezone: Tz,
) -> Result<()> {
    let day = parse_day_arg(when, SystemClock.today(timezone))?;
    let params = fetch_params(fetch, &config, timezone);
    let manager = build_manager(remote_source()?, config, cache_dir);

    let fetched = manager.fetch_day(day, &params, fetch.force_cache)?;
    let limit = if fetch.limit == 0 { usize::MAX } else { fetch.limit };
    let count = write_records(fetched.records.into_iter().take(limit))?;
    tracing::info!(count, %day, source = ?fetched.source, "day complete");
    Ok(())
}

fn run_cache_status(config: FetchConfig, cache_dir: PathBuf, timezone: Tz) -> Result<()> {
    if !cache_dir.exists() {
        println!("Cache directory does not exist: {}", cache_dir.display());
        return Ok(());
    }

    // Status never goes remote; an empty source keeps the API key optional.
    let manager = build_manager(Arc::new(InMemorySource::new()), config, cache_dir.clone());
    let status = manager.status(SystemClock.today(timezone));

    println!("Cache: {}", cache_dir.display());
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
