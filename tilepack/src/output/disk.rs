use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tilepack_tile_utils::{TileCoord, TileFormat, TileScheme};
use tokio::fs;
use tracing::{debug, info};

use crate::output::TileOutputter;
use crate::{TilepackError, TilepackResult};

/// Writes every tile to its own file, `<root>/<z>/<x>/<y>.<ext>`.
///
/// The extension is sniffed from the content, `bin` when unknown.
#[derive(Debug)]
pub struct DiskOutputter {
    root: PathBuf,
    scheme: TileScheme,
    created: HashSet<(u8, u32)>,
    saved: u64,
}

impl DiskOutputter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scheme: TileScheme::default(),
            created: HashSet::new(),
            saved: 0,
        }
    }

    /// Names files by their TMS row instead of the XYZ one.
    #[must_use]
    pub fn with_scheme(mut self, scheme: TileScheme) -> Self {
        self.scheme = scheme;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File a tile is written to. Tiles outside of the grid have no file.
    pub fn tile_path(&self, tile: TileCoord, data: &[u8]) -> TilepackResult<PathBuf> {
        if !TileCoord::is_valid(tile.z, tile.x, tile.y) {
            return Err(TilepackError::InvalidTile(tile));
        }
        let ext = TileFormat::detect(data).map_or("bin", TileFormat::extension);
        let row = self.scheme.storage_row(tile.z, tile.y);
        Ok(self
            .root
            .join(tile.z.to_string())
            .join(tile.x.to_string())
            .join(format!("{row}.{ext}")))
    }
}

#[async_trait]
impl TileOutputter for DiskOutputter {
    async fn create_output(&mut self) -> TilepackResult<()> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| TilepackError::Write(e, self.root.clone()))
    }

    async fn save(&mut self, tile: TileCoord, data: &[u8]) -> TilepackResult<()> {
        let path = self.tile_path(tile, data)?;
        if self.created.insert((tile.z, tile.x))
            && let Some(dir) = path.parent()
        {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| TilepackError::Write(e, dir.to_path_buf()))?;
        }
        debug!("Writing {tile} to {}", path.display());
        fs::write(&path, data)
            .await
            .map_err(|e| TilepackError::Write(e, path))?;
        self.saved += 1;
        Ok(())
    }

    async fn close(&mut self) -> TilepackResult<()> {
        info!("Wrote {} tiles under {}", self.saved, self.root.display());
        Ok(())
    }
}
