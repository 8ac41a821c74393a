//! Shared building blocks for the tilepack tools: tile coordinates, the
//! web-Mercator math used to enumerate tiles for a bounding box, and small
//! helpers to sniff and (de)compress tile content.

use std::fmt::{Display, Formatter};
use std::io::{Read as _, Write as _};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

mod generator;
pub use generator::{TileIter, TileRange, generate_tiles, tile_ranges};

mod mercator;
pub use mercator::{
    BoundsError, MAX_LATITUDE, bbox_to_xyz, bounds_center, check_bounds, parse_swne, tile_index,
    tile_lat, tile_lng, union_bounds, xyz_to_bbox,
};

/// Highest zoom level a [`TileCoord`] may have.
pub const MAX_ZOOM: u8 = 30;

/// Address of a single tile in the XYZ (top-left origin) tiling scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Creates a tile, returning `None` unless `z <= MAX_ZOOM` and both `x` and `y` are below `2^z`.
    #[must_use]
    pub fn new_checked(z: u8, x: u32, y: u32) -> Option<Self> {
        Self::is_valid(z, x, y).then_some(Self { z, x, y })
    }

    #[must_use]
    pub fn is_valid(z: u8, x: u32, y: u32) -> bool {
        z <= MAX_ZOOM && x < tiles_per_side(z) && y < tiles_per_side(z)
    }

    /// Geographic extent of this tile.
    #[must_use]
    pub fn bounds(&self) -> tilejson::Bounds {
        xyz_to_bbox(self.z, self.x, self.y, self.x, self.y)
    }
}

impl Display for TileCoord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Number of tiles along one side of the grid at the given zoom.
#[must_use]
pub fn tiles_per_side(zoom: u8) -> u32 {
    1_u32 << zoom
}

/// Flips a row between the XYZ and TMS conventions: `2^zoom - 1 - y`.
///
/// `y` must be a valid row for `zoom`.
#[must_use]
pub fn invert_y_value(zoom: u8, y: u32) -> u32 {
    tiles_per_side(zoom) - 1 - y
}

/// Row numbering convention used when a tile is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TileScheme {
    /// Rows are stored as requested, row 0 is the northernmost one.
    #[default]
    Xyz,
    /// Rows are stored inverted (`2^z - 1 - y`), row 0 is the southernmost one.
    Tms,
}

impl TileScheme {
    /// Converts an XYZ row into the row stored on disk.
    #[must_use]
    pub fn storage_row(self, zoom: u8, y: u32) -> u32 {
        match self {
            Self::Xyz => y,
            Self::Tms => invert_y_value(zoom, y),
        }
    }

    /// Converts a stored row back into an XYZ row. Inversion is its own inverse.
    #[must_use]
    pub fn xyz_row(self, zoom: u8, row: u32) -> u32 {
        self.storage_row(zoom, row)
    }
}

/// Image and data formats recognizable from the first bytes of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Json,
    Mvt,
}

impl TileFormat {
    /// Sniffs the format of uncompressed tile content.
    ///
    /// Gzip-compressed data is assumed to contain a vector tile.
    #[must_use]
    pub fn detect(data: &[u8]) -> Option<Self> {
        if is_gzip(data) {
            Some(Self::Mvt)
        } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if data.starts_with(b"\xFF\xD8\xFF") {
            Some(Self::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else if data.starts_with(b"{") {
            Some(Self::Json)
        } else {
            None
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Json => "application/json",
            Self::Mvt => "application/x-protobuf",
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Json => "json",
            Self::Mvt => "mvt",
        }
    }
}

/// Returns true if the data starts with the gzip magic number.
#[must_use]
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(b"\x1f\x8b")
}

pub fn encode_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

pub fn decode_gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    GzDecoder::new(data).read_to_end(&mut decompressed)?;
    Ok(decompressed)
}
