use std::path::Path;
use std::pin::pin;

use futures::{Stream, StreamExt as _, TryStreamExt as _};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row as _, SqlitePool, query, query_as};
use tilejson::Bounds;
use tilepack_tile_utils::{MAX_ZOOM, TileCoord, TileScheme, xyz_to_bbox};

use crate::errors::{MbtError, MbtResult};
use crate::mbtiles::Mbtiles;
use crate::metadata::ArchiveMetadata;

/// Read-only access to an `MBTiles` archive.
#[derive(Clone, Debug)]
pub struct MbtilesReader {
    mbt: Mbtiles,
    pool: SqlitePool,
    scheme: TileScheme,
}

impl MbtilesReader {
    pub async fn open<P: AsRef<Path>>(path: P) -> MbtResult<Self> {
        let mbt = Mbtiles::new(path)?;
        let pool = mbt.open_readonly().await?;
        Ok(Self {
            mbt,
            pool,
            scheme: TileScheme::default(),
        })
    }

    /// Sets how stored rows map back to requested rows.
    #[must_use]
    pub fn with_scheme(mut self, scheme: TileScheme) -> Self {
        self.scheme = scheme;
        self
    }

    #[must_use]
    pub fn mbtiles(&self) -> &Mbtiles {
        &self.mbt
    }

    /// Returns the content of a tile, or `None` if the archive does not have it.
    pub async fn get_tile(&self, tile: TileCoord) -> MbtResult<Option<Vec<u8>>> {
        if !TileCoord::is_valid(tile.z, tile.x, tile.y) {
            return Ok(None);
        }
        let row = self.scheme.storage_row(tile.z, tile.y);
        let data: Option<(Vec<u8>,)> = query_as(
            "SELECT tile_data FROM tiles WHERE zoom_level = ? AND tile_column = ? AND tile_row = ? LIMIT 1",
        )
        .bind(tile.z)
        .bind(tile.x)
        .bind(row)
        .fetch_optional(&self.pool)
        .await?;
        Ok(data.map(|(data,)| data))
    }

    /// Streams every stored tile in storage order.
    pub fn tiles(&self) -> impl Stream<Item = MbtResult<(TileCoord, Vec<u8>)>> + '_ {
        query("SELECT zoom_level, tile_column, tile_row, tile_data FROM tiles")
            .fetch(&self.pool)
            .map(move |row| self.decode_row(&row?))
    }

    /// Awaits `visitor` for every stored tile, stopping at the first error.
    /// Returns the number of visited tiles.
    pub async fn visit_all<F>(&self, mut visitor: F) -> MbtResult<u64>
    where
        F: AsyncFnMut(TileCoord, Vec<u8>) -> MbtResult<()>,
    {
        let mut tiles = pin!(self.tiles());
        let mut count = 0;
        while let Some((tile, data)) = tiles.try_next().await? {
            visitor(tile, data).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Lowest and highest stored zoom levels, `None` for an archive without tiles.
    pub async fn zoom_range(&self) -> MbtResult<Option<(u8, u8)>> {
        let (min, max): (Option<i64>, Option<i64>) =
            query_as("SELECT MIN(zoom_level), MAX(zoom_level) FROM tiles")
                .fetch_one(&self.pool)
                .await?;
        match (min, max) {
            (Some(min), Some(max)) => Ok(Some((self.to_zoom(min)?, self.to_zoom(max)?))),
            _ => Ok(None),
        }
    }

    /// Area covered by the tiles of the highest stored zoom level.
    pub async fn tile_extent(&self) -> MbtResult<Option<Bounds>> {
        let Some((_, zoom)) = self.zoom_range().await? else {
            return Ok(None);
        };
        let (min_col, max_col, min_row, max_row): (i64, i64, i64, i64) = query_as(
            "SELECT MIN(tile_column), MAX(tile_column), MIN(tile_row), MAX(tile_row)
             FROM tiles
             WHERE zoom_level = ?",
        )
        .bind(zoom)
        .fetch_one(&self.pool)
        .await?;

        let first = self.to_tile(i64::from(zoom), min_col, min_row)?;
        let last = self.to_tile(i64::from(zoom), max_col, max_row)?;
        Ok(Some(xyz_to_bbox(
            zoom,
            first.x,
            first.y.min(last.y),
            last.x,
            first.y.max(last.y),
        )))
    }

    pub async fn metadata(&self) -> MbtResult<ArchiveMetadata> {
        let mut conn = self.pool.acquire().await?;
        self.mbt.get_metadata(&mut *conn).await
    }

    pub async fn metadata_value(&self, key: &str) -> MbtResult<Option<String>> {
        let mut conn = self.pool.acquire().await?;
        self.mbt.get_metadata_value(&mut *conn, key).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    fn decode_row(&self, row: &SqliteRow) -> MbtResult<(TileCoord, Vec<u8>)> {
        let tile = self.to_tile(row.try_get(0)?, row.try_get(1)?, row.try_get(2)?)?;
        Ok((tile, row.try_get(3)?))
    }

    fn to_zoom(&self, zoom: i64) -> MbtResult<u8> {
        u8::try_from(zoom)
            .ok()
            .filter(|z| *z <= MAX_ZOOM)
            .ok_or_else(|| MbtError::InvalidZoomValue(self.mbt.filepath().to_string(), zoom))
    }

    fn to_tile(&self, zoom: i64, column: i64, row: i64) -> MbtResult<TileCoord> {
        let invalid = || MbtError::InvalidTileIndex(self.mbt.filepath().to_string(), zoom, column, row);
        let (Ok(z), Ok(x), Ok(stored_y)) = (u8::try_from(zoom), u32::try_from(column), u32::try_from(row))
        else {
            return Err(invalid());
        };
        if !TileCoord::is_valid(z, x, stored_y) {
            return Err(invalid());
        }
        Ok(TileCoord {
            z,
            x,
            y: self.scheme.xyz_row(z, stored_y),
        })
    }
}
