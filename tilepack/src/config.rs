use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tilejson::Bounds;
use tilepack_mbtiles::{ArchiveMetadata, DEFAULT_BATCH_SIZE, TileScheme};
use tilepack_tile_utils::{BoundsError, MAX_ZOOM, parse_swne};
use tracing::info;

use crate::fetch::UrlTemplate;

pub const DEFAULT_BOUNDS: &str = "-90.0,-180.0,90.0,180.0";
pub const DEFAULT_ZOOMS: [u8; 11] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
pub const DEFAULT_WORKERS: usize = 25;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("A tile URL template is required, use --url or TILEPACK_URL")]
    MissingUrl,

    #[error("An output path is required, use --output or TILEPACK_OUTPUT")]
    MissingOutput,

    #[error("An archive to serve is required, pass FILE or --input")]
    MissingInput,

    #[error("URL template {0} is missing {1}")]
    InvalidUrlTemplate(String, String),

    #[error("Invalid bounds: {0}")]
    InvalidBounds(#[from] BoundsError),

    #[error("At least one zoom level is required")]
    NoZooms,

    #[error("The number of workers must be at least 1")]
    NoWorkers,

    #[error("The batch size must be at least 1")]
    ZeroBatchSize,

    #[error("Unable to load config file {path}: {0}", path = .1.display())]
    ConfigLoadError(#[source] io::Error, PathBuf),

    #[error("Unable to parse config file {path}: {0}", path = .1.display())]
    ConfigParseError(#[source] serde_yaml::Error, PathBuf),

    #[error("Unable to serialize the configuration: {0}")]
    ConfigSerializeError(#[source] serde_yaml::Error),

    #[error("Unable to write config file {path}: {0}", path = .1.display())]
    ConfigWriteError(#[source] io::Error, PathBuf),
}

/// Where fetched tiles go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// A single `MBTiles` archive.
    #[default]
    Mbtiles,
    /// One file per tile, laid out as `z/x/y.ext`.
    Disk,
}

/// Settings of a build run, as read from a YAML file and the command line.
///
/// Every field is optional so that command-line values can be layered on top
/// of a file; [`BuildConfig::finalize`] applies defaults and validates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<OutputMode>,

    /// `south,west,north,east` in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zooms: Option<Vec<u8>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Request gzip from the origin and store gzip-compressed tiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gzip: Option<bool>,

    /// Per-request timeout, e.g. `60s` or `2m`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde"
    )]
    pub timeout: Option<Duration>,

    /// Store rows in the TMS convention (origin at the bottom left).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverted_y: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

/// A validated [`BuildConfig`] with every default applied.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildPlan {
    pub url: UrlTemplate,
    pub output: PathBuf,
    pub mode: OutputMode,
    pub bounds: Bounds,
    /// Sorted, without duplicates.
    pub zooms: Vec<u8>,
    pub workers: usize,
    pub gzip: bool,
    pub timeout: Duration,
    pub scheme: TileScheme,
    pub batch_size: usize,
}

impl BuildPlan {
    /// Metadata written into the archive built by this plan.
    #[must_use]
    pub fn metadata(&self) -> ArchiveMetadata {
        let min_zoom = self.zooms.first().copied().unwrap_or_default();
        let max_zoom = self.zooms.last().copied().unwrap_or_default();
        ArchiveMetadata::new(self.bounds, min_zoom, max_zoom)
    }
}

impl BuildConfig {
    pub fn finalize(&self) -> ConfigResult<BuildPlan> {
        let url = UrlTemplate::new(self.url.clone().ok_or(ConfigError::MissingUrl)?)?;
        let output = self.output.clone().ok_or(ConfigError::MissingOutput)?;
        let bounds = parse_swne(self.bounds.as_deref().unwrap_or(DEFAULT_BOUNDS))?;

        let mut zooms = self
            .zooms
            .clone()
            .unwrap_or_else(|| DEFAULT_ZOOMS.to_vec());
        zooms.sort_unstable();
        zooms.dedup();
        if zooms.is_empty() {
            return Err(ConfigError::NoZooms);
        }
        if let Some(&zoom) = zooms.iter().find(|&&z| z > MAX_ZOOM) {
            return Err(BoundsError::InvalidZoom(zoom).into());
        }

        let workers = self.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        let batch_size = self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }

        Ok(BuildPlan {
            url,
            output,
            mode: self.mode.unwrap_or_default(),
            bounds,
            zooms,
            workers,
            gzip: self.gzip.unwrap_or_default(),
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            scheme: if self.inverted_y.unwrap_or_default() {
                TileScheme::Tms
            } else {
                TileScheme::Xyz
            },
            batch_size,
        })
    }

    pub fn save_to_file(&self, file_name: PathBuf) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(&self).map_err(ConfigError::ConfigSerializeError)?;
        if file_name.as_os_str() == OsStr::new("-") {
            info!("Current build configuration:");
            println!("\n\n{yaml}\n");
            Ok(())
        } else {
            info!(
                "Saving config to {}, use --config to load it",
                file_name.display()
            );
            match File::create(&file_name) {
                Ok(mut file) => file
                    .write_all(yaml.as_bytes())
                    .map_err(|e| ConfigError::ConfigWriteError(e, file_name)),
                Err(e) => Err(ConfigError::ConfigWriteError(e, file_name)),
            }
        }
    }
}

/// Read config from a file
pub fn read_config(file_name: &Path) -> ConfigResult<BuildConfig> {
    let mut file =
        File::open(file_name).map_err(|e| ConfigError::ConfigLoadError(e, file_name.into()))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| ConfigError::ConfigLoadError(e, file_name.into()))?;
    parse_config(&contents, file_name)
}

pub fn parse_config(contents: &str, file_name: &Path) -> ConfigResult<BuildConfig> {
    serde_yaml::from_str(contents).map_err(|e| ConfigError::ConfigParseError(e, file_name.into()))
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    fn parse_cfg(yaml: &str) -> BuildConfig {
        parse_config(yaml, Path::new("<test>")).unwrap()
    }

    fn minimal() -> BuildConfig {
        BuildConfig {
            url: Some("http://tiles/{z}/{x}/{y}.png".to_string()),
            output: Some(PathBuf::from("out.mbtiles")),
            ..BuildConfig::default()
        }
    }

    #[test]
    fn defaults_when_unset() {
        let plan = minimal().finalize().unwrap();
        assert_eq!(plan.mode, OutputMode::Mbtiles);
        assert_eq!(plan.bounds, Bounds::MAX);
        assert_eq!(plan.zooms, DEFAULT_ZOOMS.to_vec());
        assert_eq!(plan.workers, 25);
        assert!(!plan.gzip);
        assert_eq!(plan.timeout, Duration::from_secs(60));
        assert_eq!(plan.scheme, TileScheme::Xyz);
        assert_eq!(plan.batch_size, 1000);

        let meta = plan.metadata();
        assert_eq!((meta.min_zoom, meta.max_zoom), (0, 10));
    }

    #[test]
    fn parse_full_file() {
        let cfg = parse_cfg(indoc! {"
            url: https://tiles.example/{z}/{x}/{y}.mvt
            output: world.mbtiles
            mode: disk
            bounds: 37.7,-122.5,37.8,-122.4
            zooms: [14, 12, 12, 13]
            workers: 4
            gzip: true
            timeout: 2m 30s
            inverted_y: true
            batch_size: 50
        "});
        let plan = cfg.finalize().unwrap();
        assert_eq!(plan.mode, OutputMode::Disk);
        assert_eq!(plan.bounds, Bounds::new(-122.5, 37.7, -122.4, 37.8));
        assert_eq!(plan.zooms, vec![12, 13, 14]);
        assert_eq!(plan.workers, 4);
        assert!(plan.gzip);
        assert_eq!(plan.timeout, Duration::from_secs(150));
        assert_eq!(plan.scheme, TileScheme::Tms);
        assert_eq!(plan.batch_size, 50);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_config("url: x\ncolour: blue\n", Path::new("build.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigParseError(_, p) if p == Path::new("build.yaml")));
    }

    #[test]
    fn validation_errors() {
        let check = |cfg: BuildConfig| cfg.finalize().unwrap_err().to_string();

        insta::assert_snapshot!(check(BuildConfig::default()), @"A tile URL template is required, use --url or TILEPACK_URL");
        insta::assert_snapshot!(check(BuildConfig { output: None, ..minimal() }), @"An output path is required, use --output or TILEPACK_OUTPUT");
        insta::assert_snapshot!(check(BuildConfig { url: Some("http://tiles/{z}".to_string()), ..minimal() }), @"URL template http://tiles/{z} is missing {x}, {y}");
        insta::assert_snapshot!(check(BuildConfig { bounds: Some("1,2,3".to_string()), ..minimal() }), @"Invalid bounds: Bounds must be four comma-separated numbers in south,west,north,east order, got '1,2,3'");
        insta::assert_snapshot!(check(BuildConfig { zooms: Some(vec![]), ..minimal() }), @"At least one zoom level is required");
        insta::assert_snapshot!(check(BuildConfig { zooms: Some(vec![3, 31]), ..minimal() }), @"Invalid bounds: Zoom level 31 is greater than the maximum zoom 30");
        insta::assert_snapshot!(check(BuildConfig { workers: Some(0), ..minimal() }), @"The number of workers must be at least 1");
        insta::assert_snapshot!(check(BuildConfig { batch_size: Some(0), ..minimal() }), @"The batch size must be at least 1");
    }

    #[test]
    fn save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.yaml");
        let cfg = BuildConfig {
            timeout: Some(Duration::from_secs(90)),
            zooms: Some(vec![0, 1]),
            ..minimal()
        };
        cfg.save_to_file(path.clone()).unwrap();
        insta::assert_snapshot!(std::fs::read_to_string(&path).unwrap(), @r"
        url: http://tiles/{z}/{x}/{y}.png
        output: out.mbtiles
        zooms:
        - 0
        - 1
        timeout: 1m 30s
        ");
        assert_eq!(read_config(&path).unwrap(), cfg);
    }

    #[test]
    fn missing_file() {
        let err = read_config(Path::new("/nonexistent/build.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigLoadError(..)));
        assert!(
            err.to_string()
                .starts_with("Unable to load config file /nonexistent/build.yaml: "),
            "{err}"
        );
    }

    #[test]
    fn unparsable_file_is_named() {
        let err = parse_config("url: [", Path::new("broken.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigParseError(..)));
        assert!(
            err.to_string()
                .starts_with("Unable to parse config file broken.yaml: "),
            "{err}"
        );
    }
}
