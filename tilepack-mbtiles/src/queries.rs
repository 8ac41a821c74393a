use sqlx::{Executor as _, SqliteExecutor, query, query_as};
use tracing::debug;

use crate::errors::MbtResult;

/// Returns true if the database has both the `map` and `images` tables.
pub async fn has_normalized_tables<T>(conn: &mut T) -> MbtResult<bool>
where
    for<'e> &'e mut T: SqliteExecutor<'e>,
{
    let row: (i64,) = query_as(
        "SELECT COUNT(*)
         FROM sqlite_master
         WHERE type = 'table'
           AND name IN ('map', 'images')",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.0 == 2)
}

pub async fn create_metadata_table<T>(conn: &mut T) -> MbtResult<()>
where
    for<'e> &'e mut T: SqliteExecutor<'e>,
{
    debug!("Creating metadata table if it doesn't already exist");
    conn.execute(
        "CREATE TABLE IF NOT EXISTS metadata (
             name text,
             value text);
         CREATE UNIQUE INDEX IF NOT EXISTS name ON metadata (name);",
    )
    .await?;

    Ok(())
}

/// Creates the content-addressed `map` + `images` layout and the `tiles` view joining them.
pub async fn create_normalized_tables<T>(conn: &mut T) -> MbtResult<()>
where
    for<'e> &'e mut T: SqliteExecutor<'e>,
{
    debug!("Creating if needed normalized table: map(z,x,y,id)");
    conn.execute(
        "CREATE TABLE IF NOT EXISTS map (
             zoom_level integer NOT NULL,
             tile_column integer NOT NULL,
             tile_row integer NOT NULL,
             tile_id text NOT NULL);
         CREATE UNIQUE INDEX IF NOT EXISTS map_index ON map (zoom_level, tile_column, tile_row);",
    )
    .await?;

    debug!("Creating if needed normalized table: images(data,id)");
    conn.execute(
        "CREATE TABLE IF NOT EXISTS images (
             tile_data blob NOT NULL,
             tile_id text NOT NULL);
         CREATE UNIQUE INDEX IF NOT EXISTS images_id ON images (tile_id);",
    )
    .await?;

    debug!("Creating if needed tiles view for the normalized tables");
    conn.execute(
        "CREATE VIEW IF NOT EXISTS tiles AS
             SELECT map.zoom_level AS zoom_level,
                    map.tile_column AS tile_column,
                    map.tile_row AS tile_row,
                    images.tile_data AS tile_data
             FROM map
             JOIN images ON images.tile_id = map.tile_id;",
    )
    .await?;

    Ok(())
}

pub async fn init_mbtiles_schema<T>(conn: &mut T) -> MbtResult<()>
where
    for<'e> &'e mut T: SqliteExecutor<'e>,
{
    create_normalized_tables(&mut *conn).await?;
    create_metadata_table(&mut *conn).await
}

/// Stores the content under its id, then points the coordinate at it.
/// Both statements replace existing rows, so repeated saves leave one row of each.
pub async fn upsert_tile<T>(
    conn: &mut T,
    zoom: u8,
    column: u32,
    row: u32,
    tile_id: &str,
    data: &[u8],
) -> MbtResult<()>
where
    for<'e> &'e mut T: SqliteExecutor<'e>,
{
    query("INSERT OR REPLACE INTO images (tile_id, tile_data) VALUES (?, ?)")
        .bind(tile_id)
        .bind(data)
        .execute(&mut *conn)
        .await?;
    query("INSERT OR REPLACE INTO map (zoom_level, tile_column, tile_row, tile_id) VALUES (?, ?, ?, ?)")
        .bind(zoom)
        .bind(column)
        .bind(row)
        .bind(tile_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::{Connection as _, SqliteConnection};

    use super::*;

    #[actix_rt::test]
    async fn schema_is_idempotent() -> MbtResult<()> {
        let mut conn = SqliteConnection::connect(":memory:").await?;
        assert!(!has_normalized_tables(&mut conn).await?);
        init_mbtiles_schema(&mut conn).await?;
        init_mbtiles_schema(&mut conn).await?;
        assert!(has_normalized_tables(&mut conn).await?);

        let names: Vec<(String,)> = query_as(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'index', 'view') ORDER BY name",
        )
        .fetch_all(&mut conn)
        .await?;
        let names: Vec<_> = names.into_iter().map(|(n,)| n).collect();
        assert_eq!(
            names,
            ["images", "images_id", "map", "map_index", "metadata", "name", "tiles"]
        );
        Ok(())
    }

    #[actix_rt::test]
    async fn upsert_keeps_single_rows() -> MbtResult<()> {
        let mut conn = SqliteConnection::connect(":memory:").await?;
        init_mbtiles_schema(&mut conn).await?;
        for _ in 0..3 {
            upsert_tile(&mut conn, 3, 1, 2, "abc", b"data").await?;
        }
        upsert_tile(&mut conn, 3, 1, 3, "abc", b"data").await?;

        let (maps, images): (i64, i64) = query_as(
            "SELECT (SELECT COUNT(*) FROM map), (SELECT COUNT(*) FROM images)",
        )
        .fetch_one(&mut conn)
        .await?;
        assert_eq!((maps, images), (2, 1));
        Ok(())
    }
}
