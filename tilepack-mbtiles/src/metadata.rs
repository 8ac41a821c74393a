use std::str::FromStr;

use sqlx::{SqliteExecutor, query, query_as};
use tilejson::Bounds;
use tilepack_tile_utils::{bounds_center, union_bounds};
use tracing::debug;

use crate::errors::{MbtError, MbtResult};
use crate::mbtiles::Mbtiles;

/// Archive-level description stored in the `metadata` table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArchiveMetadata {
    pub bounds: Bounds,
    /// `(lng, lat)`
    pub center: (f64, f64),
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl ArchiveMetadata {
    /// Describes an archive covering `bounds`; the center is the midpoint of the bounds.
    #[must_use]
    pub fn new(bounds: Bounds, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            bounds,
            center: bounds_center(&bounds),
            min_zoom,
            max_zoom,
        }
    }

    /// Combined description of two archives: union of the bounds, widest zoom range.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self::new(
            union_bounds(&self.bounds, &other.bounds),
            self.min_zoom.min(other.min_zoom),
            self.max_zoom.max(other.max_zoom),
        )
    }

    /// Key/value rows as written to the `metadata` table.
    #[must_use]
    pub fn to_key_values(&self) -> [(&'static str, String); 4] {
        let b = &self.bounds;
        [
            (
                "bounds",
                format!("{:.6},{:.6},{:.6},{:.6}", b.left, b.bottom, b.right, b.top),
            ),
            ("center", format!("{:.6},{:.6}", self.center.0, self.center.1)),
            ("minzoom", self.min_zoom.to_string()),
            ("maxzoom", self.max_zoom.to_string()),
        ]
    }
}

fn parse_floats(value: &str) -> Option<Vec<f64>> {
    value
        .split(',')
        .map(|v| f64::from_str(v.trim()).ok())
        .collect()
}

impl Mbtiles {
    pub async fn get_metadata_value<T>(&self, conn: &mut T, key: &str) -> MbtResult<Option<String>>
    where
        for<'e> &'e mut T: SqliteExecutor<'e>,
    {
        let row: Option<(Option<String>,)> =
            query_as("SELECT value FROM metadata WHERE name = ?")
                .bind(key)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(row.and_then(|(value,)| value))
    }

    /// Writes the archive description unless the keys are already present.
    pub async fn insert_metadata<T>(&self, conn: &mut T, metadata: &ArchiveMetadata) -> MbtResult<()>
    where
        for<'e> &'e mut T: SqliteExecutor<'e>,
    {
        for (name, value) in metadata.to_key_values() {
            debug!("Setting metadata {name}={value} in {self} unless already present");
            query("INSERT OR IGNORE INTO metadata (name, value) VALUES (?, ?)")
                .bind(name)
                .bind(value)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }

    async fn required_value<T>(&self, conn: &mut T, key: &'static str) -> MbtResult<String>
    where
        for<'e> &'e mut T: SqliteExecutor<'e>,
    {
        self.get_metadata_value(&mut *conn, key)
            .await?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| MbtError::MissingMetadata(self.filepath().to_string(), key))
    }

    fn invalid(&self, key: &'static str, value: String) -> MbtError {
        MbtError::InvalidMetadata(self.filepath().to_string(), key, value)
    }

    /// Reads `bounds`, `center`, `minzoom` and `maxzoom`.
    ///
    /// The center may carry a third (zoom) component, which is ignored.
    pub async fn get_metadata<T>(&self, conn: &mut T) -> MbtResult<ArchiveMetadata>
    where
        for<'e> &'e mut T: SqliteExecutor<'e>,
    {
        let value = self.required_value(&mut *conn, "bounds").await?;
        let bounds = match parse_floats(&value).as_deref() {
            Some(&[left, bottom, right, top]) => Bounds::new(left, bottom, right, top),
            _ => return Err(self.invalid("bounds", value)),
        };

        let value = self.required_value(&mut *conn, "center").await?;
        let center = match parse_floats(&value).as_deref() {
            Some(&[lng, lat] | &[lng, lat, _]) => (lng, lat),
            _ => return Err(self.invalid("center", value)),
        };

        let mut zooms = [0_u8; 2];
        for (zoom, key) in zooms.iter_mut().zip(["minzoom", "maxzoom"]) {
            let value = self.required_value(&mut *conn, key).await?;
            *zoom = match u8::from_str(value.trim()) {
                Ok(v) => v,
                Err(_) => return Err(self.invalid(key, value)),
            };
        }

        Ok(ArchiveMetadata {
            bounds,
            center,
            min_zoom: zooms[0],
            max_zoom: zooms[1],
        })
    }
}
