//! Command-line arguments of the tilepack binaries.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser};

use crate::config::{
    BuildConfig, DEFAULT_BOUNDS, DEFAULT_TIMEOUT, DEFAULT_WORKERS, OutputMode,
};
use crate::srv::LISTEN_ADDRESS_DEFAULT;

/// Defines the styles used for the CLI help output.
pub const HELP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Blue.on_default().bold())
    .usage(AnsiColor::Blue.on_default().bold())
    .literal(AnsiColor::White.on_default())
    .placeholder(AnsiColor::Green.on_default());

const LOGGING_HELP: &str = "Use RUST_LOG environment variable to control logging level, e.g. RUST_LOG=debug or RUST_LOG=tilepack=debug.\nUse TILEPACK_LOG_FORMAT environment variable to control output format: compact, full, pretty, or json.";

/// Parse a human-readable duration string (e.g., "60s", "2m")
fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

// None of these params will be transferred to the config
#[derive(Args, Debug, Clone, PartialEq, Default)]
pub struct MetaArgs {
    /// Path to a YAML config file. Command-line values override the values it contains.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Save the resulting config to a file or use "-" to print to stdout.
    #[arg(long)]
    pub save_config: Option<PathBuf>,
}

#[derive(Parser, Debug, PartialEq, Default)]
#[command(
    name = "tilepack-build",
    about = "Download the tiles of a bounding box into an MBTiles archive or a directory tree",
    version,
    after_help = LOGGING_HELP,
    styles = HELP_STYLES
)]
pub struct BuildArgs {
    #[command(flatten)]
    pub meta: MetaArgs,
    /// URL template to request tiles with, containing {z}, {x} and {y}.
    #[arg(short, long, env = "TILEPACK_URL")]
    pub url: Option<String>,
    /// Path of the archive, or the root directory in disk mode.
    #[arg(short, long, alias = "dsn", env = "TILEPACK_OUTPUT")]
    pub output: Option<PathBuf>,
    /// Where to write the tiles. [DEFAULT: mbtiles]
    #[arg(short, long, value_enum)]
    pub mode: Option<OutputMode>,
    #[arg(help = format!("Comma-separated bounding box in south,west,north,east order. [DEFAULT: {DEFAULT_BOUNDS}]"), short, long, allow_hyphen_values = true)]
    pub bounds: Option<String>,
    /// Comma-separated list of zoom levels. [DEFAULT: 0,1,2,3,4,5,6,7,8,9,10]
    #[arg(short, long, value_delimiter = ',')]
    pub zooms: Option<Vec<u8>>,
    #[arg(help = format!("Number of HTTP workers. [DEFAULT: {DEFAULT_WORKERS}]"), short, long, env = "TILEPACK_WORKERS")]
    pub workers: Option<usize>,
    /// Request gzip from the server and store gzipped tiles, compressing locally if the server does not.
    #[arg(long)]
    pub gzip: bool,
    #[arg(help = format!("Timeout of a single tile request, e.g. 30s or 2m. [DEFAULT: {}s]", DEFAULT_TIMEOUT.as_secs()), long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
    /// Store rows in the TMS convention, with row 0 at the bottom.
    #[arg(long)]
    pub inverted_y: bool,
    /// Number of tiles committed to the archive at once. [DEFAULT: 1000]
    #[arg(long)]
    pub batch_size: Option<usize>,
}

impl BuildArgs {
    /// Overrides the values of `config` with the ones given on the command line.
    pub fn merge_into_config(self, config: &mut BuildConfig) {
        if self.url.is_some() {
            config.url = self.url;
        }
        if self.output.is_some() {
            config.output = self.output;
        }
        if self.mode.is_some() {
            config.mode = self.mode;
        }
        if self.bounds.is_some() {
            config.bounds = self.bounds;
        }
        if self.zooms.is_some() {
            config.zooms = self.zooms;
        }
        if self.workers.is_some() {
            config.workers = self.workers;
        }
        if self.gzip {
            config.gzip = Some(true);
        }
        if self.timeout.is_some() {
            config.timeout = self.timeout;
        }
        if self.inverted_y {
            config.inverted_y = Some(true);
        }
        if self.batch_size.is_some() {
            config.batch_size = self.batch_size;
        }
    }
}

#[derive(Parser, Debug, PartialEq)]
#[command(
    name = "tilepack-merge",
    about = "Merge several MBTiles archives into a new one",
    version,
    after_help = LOGGING_HELP,
    styles = HELP_STYLES
)]
pub struct MergeArgs {
    /// The archive to create. It must not exist yet.
    #[arg(short, long)]
    pub output: PathBuf,
    /// Archives to merge. Later archives win when the same tile is present in several.
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,
    /// Number of tiles committed to the output at once. [DEFAULT: 1000]
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Parser, Debug, PartialEq)]
#[command(
    name = "tilepack-serve",
    about = "Serve the tiles of an MBTiles archive over HTTP",
    version,
    after_help = LOGGING_HELP,
    styles = HELP_STYLES
)]
pub struct ServeArgs {
    /// The archive to serve.
    #[arg(required_unless_present = "input")]
    pub file: Option<PathBuf>,
    /// The archive to serve, same as FILE.
    #[arg(short, long, conflicts_with = "file")]
    pub input: Option<PathBuf>,
    #[arg(help = format!("The address and port to listen on. [DEFAULT: {LISTEN_ADDRESS_DEFAULT}]"), short, long, env = "TILEPACK_LISTEN")]
    pub listen: Option<String>,
    /// The archive stores rows in the TMS convention.
    #[arg(long)]
    pub tms: bool,
}

impl ServeArgs {
    #[must_use]
    pub fn archive(&self) -> Option<&PathBuf> {
        self.file.as_ref().or(self.input.as_ref())
    }

    #[must_use]
    pub fn listen_address(&self) -> &str {
        self.listen.as_deref().unwrap_or(LISTEN_ADDRESS_DEFAULT)
    }
}
