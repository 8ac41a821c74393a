#![forbid(unsafe_code)]
//! Bulk tile downloading into `MBTiles` archives or directory trees.
//!
//! [`pipeline::Pipeline`] enumerates the tiles of a bounding box, fetches them
//! concurrently with [`fetch::RetryingFetcher`] and hands the results to a
//! [`output::TileOutputter`]. The archive format lives in `tilepack-mbtiles`.

pub mod args;
pub mod config;
pub mod fetch;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod srv;

mod error;
pub use error::{TilepackError, TilepackResult};
