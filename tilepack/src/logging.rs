//! Logging initialization using `tracing` and `tracing-subscriber`.
//!
//! Every binary reads two environment variables:
//! - `RUST_LOG` selects what is logged (standard `EnvFilter` syntax)
//! - `TILEPACK_LOG_FORMAT` selects the output format (compact, full, pretty, json)

use std::str::FromStr;

use tracing_log::{InterestCacheConfig, LogTracer};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _, Registry, fmt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "tilepack=info,tilepack_mbtiles=info";

/// Name of the environment variable holding the [`LogFormat`].
pub const LOG_FORMAT_ENV: &str = "TILEPACK_LOG_FORMAT";

/// Log output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, single-line logs.
    Full,
    /// A variant of the full format, optimized for short line lengths.
    Compact,
    /// Multi-line logs for local development and debugging.
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Pretty
        } else {
            Self::Compact
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "compact" => Ok(Self::Compact),
            "pretty" | "verbose" => Ok(Self::Pretty),
            "json" | "jsonl" => Ok(Self::Json),
            _ => Err(format!(
                "Invalid log format '{s}'. Valid options: full, compact, pretty, json"
            )),
        }
    }
}

/// Returns the `RUST_LOG` value, or [`DEFAULT_FILTER`].
///
/// When the user only configured the `tilepack` target, the same level is applied
/// to the storage crate so that archive logs follow the tool's verbosity.
#[must_use]
pub fn filter_from_env(rust_log: Option<String>) -> String {
    let Some(rust_log) = rust_log else {
        return DEFAULT_FILTER.to_string();
    };
    if rust_log.contains("tilepack_mbtiles=") {
        return rust_log;
    }
    match rust_log.split(',').find_map(|s| s.strip_prefix("tilepack=")) {
        Some(level) => format!("{rust_log},tilepack_mbtiles={level}"),
        None => rust_log,
    }
}

/// Initialize the global tracing subscriber for the given filter and format.
///
/// `log` records emitted by dependencies are bridged into `tracing`.
/// An invalid filter falls back to `debug`, an invalid format to the default one.
pub fn init_tracing(filter: &str, format: Option<String>) {
    if let Err(e) = LogTracer::builder()
        .with_interest_cache(InterestCacheConfig::default())
        .init()
    {
        eprintln!("Warning: unable to bridge log records into tracing: {e}");
    }

    let env_filter = EnvFilter::from_str(filter).unwrap_or_else(|_| {
        eprintln!("Warning: Invalid filter string '{filter}' passed, using 'debug' instead");
        EnvFilter::new("debug")
    });

    let format = format
        .and_then(|s| {
            s.parse::<LogFormat>()
                .map_err(|e| eprintln!("Warning: {e}. Falling back to the default format"))
                .ok()
        })
        .unwrap_or_default();

    let layer = match format {
        LogFormat::Full => fmt::layer()
            .with_span_events(FmtSpan::NONE)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_span_events(FmtSpan::NONE)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_filter(env_filter).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_span_events(FmtSpan::NONE)
            .with_filter(env_filter)
            .boxed(),
    };
    if let Err(e) = Registry::default().with(layer).try_init() {
        eprintln!("Warning: logging was already initialized: {e}");
    }
}
