//! Destinations for fetched tiles.

mod disk;
pub use disk::DiskOutputter;

use async_trait::async_trait;
use tilepack_mbtiles::{MbtilesWriter, WriterOptions};
use tilepack_tile_utils::TileCoord;

use crate::TilepackResult;
use crate::config::{BuildPlan, OutputMode};

/// Receives every fetched tile of a run. Driven by a single task.
#[async_trait]
pub trait TileOutputter: Send {
    /// Prepares the destination before the first tile arrives.
    async fn create_output(&mut self) -> TilepackResult<()>;

    async fn save(&mut self, tile: TileCoord, data: &[u8]) -> TilepackResult<()>;

    /// Flushes everything saved so far. No tile may be saved afterwards.
    async fn close(&mut self) -> TilepackResult<()>;
}

#[async_trait]
impl<T: TileOutputter + ?Sized> TileOutputter for Box<T> {
    async fn create_output(&mut self) -> TilepackResult<()> {
        (**self).create_output().await
    }

    async fn save(&mut self, tile: TileCoord, data: &[u8]) -> TilepackResult<()> {
        (**self).save(tile, data).await
    }

    async fn close(&mut self) -> TilepackResult<()> {
        (**self).close().await
    }
}

#[async_trait]
impl TileOutputter for MbtilesWriter {
    async fn create_output(&mut self) -> TilepackResult<()> {
        Ok(self.ensure_schema().await?)
    }

    async fn save(&mut self, tile: TileCoord, data: &[u8]) -> TilepackResult<()> {
        Ok(MbtilesWriter::save(self, tile, data).await?)
    }

    async fn close(&mut self) -> TilepackResult<()> {
        Ok(MbtilesWriter::close(self).await?)
    }
}

/// Opens the destination selected by the plan.
pub async fn open_outputter(plan: &BuildPlan) -> TilepackResult<Box<dyn TileOutputter>> {
    let outputter: Box<dyn TileOutputter> = match plan.mode {
        OutputMode::Mbtiles => {
            let options = WriterOptions {
                batch_size: plan.batch_size,
                scheme: plan.scheme,
            };
            Box::new(MbtilesWriter::open(&plan.output, plan.metadata(), options).await?)
        }
        OutputMode::Disk => Box::new(DiskOutputter::new(&plan.output).with_scheme(plan.scheme)),
    };
    Ok(outputter)
}
