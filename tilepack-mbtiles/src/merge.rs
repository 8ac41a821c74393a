use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::errors::{MbtError, MbtResult};
use crate::metadata::ArchiveMetadata;
use crate::reader::MbtilesReader;
use crate::writer::{DEFAULT_BATCH_SIZE, MbtilesWriter, WriterOptions};

fn source_error(path: &Path, err: MbtError) -> MbtError {
    MbtError::MergeSource {
        path: path.to_path_buf(),
        source: Box::new(err),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSummary {
    pub sources: usize,
    pub tiles: u64,
}

/// Combines several archives into a new one.
///
/// Sources are copied one after another in the given order, so when two sources
/// have the same tile, the later one wins. Rows are copied as stored.
#[derive(Clone, Debug)]
pub struct MbtilesMerger {
    sources: Vec<PathBuf>,
    destination: PathBuf,
    batch_size: usize,
}

impl MbtilesMerger {
    #[must_use]
    pub fn new(sources: Vec<PathBuf>, destination: PathBuf) -> Self {
        Self {
            sources,
            destination,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub async fn run(&self) -> MbtResult<MergeSummary> {
        if self.sources.is_empty() {
            return Err(MbtError::NoMergeSources);
        }
        if self.destination.exists() {
            return Err(MbtError::DestinationFileExists(self.destination.clone()));
        }

        let mut readers = Vec::with_capacity(self.sources.len());
        let mut combined: Option<ArchiveMetadata> = None;
        for path in &self.sources {
            let reader = MbtilesReader::open(path)
                .await
                .map_err(|e| source_error(path, e))?;
            let metadata = reader
                .metadata()
                .await
                .map_err(|e| source_error(path, e))?;
            debug!("{} covers {:?}", path.display(), metadata);
            combined = Some(combined.map_or(metadata, |c| c.merge(&metadata)));
            readers.push((path, reader));
        }
        let Some(metadata) = combined else {
            return Err(MbtError::NoMergeSources);
        };

        info!(
            "Merging {} archives into {}",
            readers.len(),
            self.destination.display()
        );
        let options = WriterOptions {
            batch_size: self.batch_size,
            ..WriterOptions::default()
        };
        let mut writer = MbtilesWriter::open(&self.destination, metadata, options).await?;
        writer.ensure_schema().await?;

        let start = Instant::now();
        let mut copied = Ok(());
        for (path, reader) in readers {
            if copied.is_ok() {
                copied = Self::copy_source(&reader, &mut writer)
                    .await
                    .map(|count| info!("Copied {count} tiles from {}", path.display()))
                    .map_err(|e| source_error(path, e));
            }
            reader.close().await;
        }
        if let Err(e) = copied {
            if let Err(close_err) = writer.close().await {
                warn!("Unable to close {}: {close_err}", self.destination.display());
            }
            self.discard_destination();
            return Err(e);
        }
        if let Err(e) = writer.close().await {
            self.discard_destination();
            return Err(e);
        }

        let tiles = writer.saved();
        info!(
            "Merged {tiles} tiles into {} in {:.1}s",
            self.destination.display(),
            start.elapsed().as_secs_f32()
        );
        Ok(MergeSummary {
            sources: self.sources.len(),
            tiles,
        })
    }

    async fn copy_source(reader: &MbtilesReader, writer: &mut MbtilesWriter) -> MbtResult<u64> {
        reader
            .visit_all(async |tile, data| writer.save(tile, &data).await)
            .await
    }

    /// Removes a partially written destination so that the merge can be re-run.
    fn discard_destination(&self) {
        debug!("Removing the incomplete {}", self.destination.display());
        if let Err(e) = fs::remove_file(&self.destination) {
            warn!("Unable to remove {}: {e}", self.destination.display());
        }
    }
}
