use std::path::PathBuf;

use tilepack_tile_utils::TileCoord;

#[derive(thiserror::Error, Debug)]
pub enum MbtError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error("MBTile filepath contains unsupported characters: {}", .0.display())]
    UnsupportedCharsInFilepath(PathBuf),

    #[error("Metadata key `{1}` is not set in MBTiles file {0}")]
    MissingMetadata(String, &'static str),

    #[error("Metadata key `{1}` has an invalid value `{2}` in MBTiles file {0}")]
    InvalidMetadata(String, &'static str, String),

    #[error("At least one tile in the tiles table/view has an invalid value: zoom_level={1}, tile_column={2}, tile_row={3} in MBTile file {0}")]
    InvalidTileIndex(String, i64, i64, i64),

    #[error("Tile {1} is outside of the tile grid, refusing to save it to {0}")]
    InvalidTile(String, TileCoord),

    #[error("Invalid zoom value {1} in MBTile file {0}")]
    InvalidZoomValue(String, i64),

    #[error("At least one source MBTiles file is required to merge")]
    NoMergeSources,

    #[error("The destination file {} already exists, refusing to overwrite it", .0.display())]
    DestinationFileExists(PathBuf),

    #[error("Unable to merge tiles from {}: {source}", .path.display())]
    MergeSource {
        path: PathBuf,
        #[source]
        source: Box<MbtError>,
    },
}

pub type MbtResult<T> = Result<T, MbtError>;
