use std::mem;
use std::path::Path;

use sqlx::{Sqlite, SqlitePool, Transaction};
use tilepack_tile_utils::{TileCoord, TileScheme};
use tracing::{debug, info};

use crate::errors::{MbtError, MbtResult};
use crate::mbtiles::Mbtiles;
use crate::metadata::ArchiveMetadata;
use crate::queries::{init_mbtiles_schema, upsert_tile};

/// Default number of saves per committed transaction.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriterOptions {
    /// Number of saves grouped into one transaction. Zero behaves like one.
    pub batch_size: usize,
    /// How requested rows are stored.
    pub scheme: TileScheme,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            scheme: TileScheme::default(),
        }
    }
}

enum TxState {
    Idle,
    Open {
        tx: Transaction<'static, Sqlite>,
        pending: usize,
    },
}

/// Lowercase hex MD5 of the tile content, used as its key in the `images` table.
#[must_use]
pub fn compute_tile_id(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Writes tiles into a content-addressed `MBTiles` archive.
///
/// Identical contents are stored once. Saves are grouped into transactions of
/// [`WriterOptions::batch_size`] tiles, and nothing saved since the last commit is
/// durable until [`MbtilesWriter::close`] succeeds. The writer owns its only
/// connection, so it must be driven by a single task.
pub struct MbtilesWriter {
    mbt: Mbtiles,
    pool: SqlitePool,
    metadata: ArchiveMetadata,
    options: WriterOptions,
    state: TxState,
    has_schema: bool,
    has_metadata: bool,
    saved: u64,
}

impl MbtilesWriter {
    pub async fn open<P: AsRef<Path>>(
        path: P,
        metadata: ArchiveMetadata,
        options: WriterOptions,
    ) -> MbtResult<Self> {
        let mbt = Mbtiles::new(path)?;
        let pool = mbt.open_for_write().await?;
        Ok(Self {
            mbt,
            pool,
            metadata,
            options,
            state: TxState::Idle,
            has_schema: false,
            has_metadata: false,
            saved: 0,
        })
    }

    #[must_use]
    pub fn mbtiles(&self) -> &Mbtiles {
        &self.mbt
    }

    #[must_use]
    pub fn metadata(&self) -> &ArchiveMetadata {
        &self.metadata
    }

    /// Number of tiles saved by this writer, committed or not.
    #[must_use]
    pub fn saved(&self) -> u64 {
        self.saved
    }

    /// Number of saves waiting in the open transaction.
    #[must_use]
    pub fn pending(&self) -> usize {
        match &self.state {
            TxState::Idle => 0,
            TxState::Open { pending, .. } => *pending,
        }
    }

    /// Creates the tables, indexes and the `tiles` view unless this writer already did.
    pub async fn ensure_schema(&mut self) -> MbtResult<()> {
        if !self.has_schema {
            let mut conn = self.pool.acquire().await?;
            init_mbtiles_schema(&mut *conn).await?;
            self.has_schema = true;
        }
        Ok(())
    }

    async fn ensure_metadata(&mut self) -> MbtResult<()> {
        if !self.has_metadata {
            let mut conn = self.pool.acquire().await?;
            self.mbt.insert_metadata(&mut *conn, &self.metadata).await?;
            self.has_metadata = true;
        }
        Ok(())
    }

    pub async fn save(&mut self, tile: TileCoord, data: &[u8]) -> MbtResult<()> {
        if !TileCoord::is_valid(tile.z, tile.x, tile.y) {
            return Err(MbtError::InvalidTile(self.mbt.to_string(), tile));
        }
        self.ensure_schema().await?;
        self.ensure_metadata().await?;

        let tile_id = compute_tile_id(data);
        let row = self.options.scheme.storage_row(tile.z, tile.y);

        let (mut tx, pending) = match mem::replace(&mut self.state, TxState::Idle) {
            TxState::Idle => (self.pool.begin().await?, 0),
            TxState::Open { tx, pending } => (tx, pending),
        };
        upsert_tile(&mut *tx, tile.z, tile.x, row, &tile_id, data).await?;
        self.saved += 1;

        let pending = pending + 1;
        if pending >= self.options.batch_size.max(1) {
            debug!("Committing {pending} tiles to {}", self.mbt);
            tx.commit().await?;
        } else {
            self.state = TxState::Open { tx, pending };
        }
        Ok(())
    }

    /// Commits the open transaction, if any, and releases the file.
    ///
    /// An archive closed before its first save still gets its schema and metadata.
    /// The pool is closed even when the commit fails; the first error is returned.
    pub async fn close(&mut self) -> MbtResult<()> {
        let result = match mem::replace(&mut self.state, TxState::Idle) {
            TxState::Idle => Ok(()),
            TxState::Open { tx, pending } => {
                debug!("Committing the last {pending} tiles to {}", self.mbt);
                tx.commit().await.map_err(MbtError::from)
            }
        };
        let result = match result {
            Ok(()) if !self.has_metadata => self.finish_empty().await,
            other => other,
        };
        self.pool.close().await;
        info!("Closed {} after saving {} tiles", self.mbt, self.saved);
        result
    }

    async fn finish_empty(&mut self) -> MbtResult<()> {
        self.ensure_schema().await?;
        self.ensure_metadata().await
    }
}
