use std::ffi::OsStr;
use std::fmt::{Display, Formatter};
use std::path::Path;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use tracing::debug;

use crate::errors::{MbtError, MbtResult};

/// Location of an `MBTiles` file, and the ways of opening it.
#[derive(Clone, Debug)]
pub struct Mbtiles {
    filepath: String,
    filename: String,
}

impl Display for Mbtiles {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.filepath)
    }
}

impl Mbtiles {
    pub fn new<P: AsRef<Path>>(filepath: P) -> MbtResult<Self> {
        let path = filepath.as_ref();
        Ok(Self {
            filepath: path
                .to_str()
                .ok_or_else(|| MbtError::UnsupportedCharsInFilepath(path.to_path_buf()))?
                .to_string(),
            filename: path
                .file_stem()
                .unwrap_or_else(|| OsStr::new("unknown"))
                .to_string_lossy()
                .to_string(),
        })
    }

    /// Opens the file for writing, creating it if needed.
    ///
    /// The pool holds a single connection so that every statement of a write session
    /// goes through the same `SQLite` handle. Writes are not synced to disk.
    pub async fn open_for_write(&self) -> MbtResult<SqlitePool> {
        debug!("Opening or creating {self} for writing");
        let opt = SqliteConnectOptions::new()
            .filename(self.filepath())
            .create_if_missing(true)
            .synchronous(SqliteSynchronous::Off);
        Ok(SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opt)
            .await?)
    }

    pub async fn open_readonly(&self) -> MbtResult<SqlitePool> {
        debug!("Opening as readonly {self}");
        let opt = SqliteConnectOptions::new()
            .filename(self.filepath())
            .read_only(true);
        Ok(SqlitePool::connect_with(opt).await?)
    }

    #[must_use]
    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }
}
