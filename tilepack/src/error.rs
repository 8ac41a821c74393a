use std::io;
use std::path::PathBuf;

use tilepack_mbtiles::MbtError;
use tilepack_tile_utils::{BoundsError, TileCoord};
use tokio::task::JoinError;

use crate::config::ConfigError;

/// A convenience [`Result`] for the tilepack crate.
pub type TilepackResult<T> = Result<T, TilepackError>;

#[derive(thiserror::Error, Debug)]
pub enum TilepackError {
    #[error(transparent)]
    Mbt(#[from] MbtError),

    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unable to create the HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Unable to write {path}: {0}", path = .1.display())]
    Write(#[source] io::Error, PathBuf),

    #[error("Tile {0} is outside of the tile grid")]
    InvalidTile(TileCoord),

    #[error("Unable to bind to {1}: {0}")]
    Binding(#[source] io::Error, String),

    #[error("A pipeline task failed: {0}")]
    Task(#[from] JoinError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
