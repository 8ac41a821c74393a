//! Content-addressed `MBTiles` storage.
//!
//! Tiles are keyed by the MD5 of their content in an `images` table, and a `map`
//! table points every tile coordinate at its content.

mod errors;
pub use errors::{MbtError, MbtResult};

mod mbtiles;
pub use mbtiles::Mbtiles;

mod merge;
pub use merge::{MbtilesMerger, MergeSummary};

mod metadata;
pub use metadata::ArchiveMetadata;

mod queries;
pub use queries::{has_normalized_tables, init_mbtiles_schema};

mod reader;
pub use reader::MbtilesReader;

mod writer;
// Re-export the tile types so that consumers don't need to depend on the tile-utils crate directly
pub use tilepack_tile_utils::{TileCoord, TileScheme};
pub use writer::{DEFAULT_BATCH_SIZE, MbtilesWriter, WriterOptions, compute_tile_id};
