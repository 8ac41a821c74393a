//! Enumerates the tiles covering a bounding box over a set of zoom levels.
//!
//! Tiles come out ordered by zoom, then by row, then by column.

use std::fmt::{Display, Formatter};
use std::iter::FusedIterator;

use tilejson::Bounds;

use crate::{BoundsError, MAX_ZOOM, TileCoord, bbox_to_xyz, check_bounds};

/// Inclusive range of XYZ tiles at a single zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRange {
    #[must_use]
    pub fn new(zoom: u8, bounds: &Bounds) -> Self {
        let (min_x, min_y, max_x, max_y) = bbox_to_xyz(bounds, zoom);
        Self {
            zoom,
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Number of tiles in the range.
    #[must_use]
    pub fn size(&self) -> u64 {
        u64::from(self.max_x - self.min_x + 1) * u64::from(self.max_y - self.min_y + 1)
    }
}

impl Display for TileRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "z{} x {}..={} y {}..={}",
            self.zoom, self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

/// Per-zoom tile ranges covering `bounds`, one per distinct zoom in ascending order.
pub fn tile_ranges(bounds: &Bounds, zooms: &[u8]) -> Result<Vec<TileRange>, BoundsError> {
    check_bounds(bounds)?;
    let mut zooms = zooms.to_vec();
    zooms.sort_unstable();
    zooms.dedup();
    if let Some(&zoom) = zooms.last().filter(|&&z| z > MAX_ZOOM) {
        return Err(BoundsError::InvalidZoom(zoom));
    }
    Ok(zooms.into_iter().map(|z| TileRange::new(z, bounds)).collect())
}

/// Lazy iterator over the tiles of a list of [`TileRange`]s.
///
/// A clone continues from the same position as the original.
/// Build a new one with [`TileIter::new`] to enumerate again.
#[derive(Debug, Clone)]
pub struct TileIter {
    ranges: Vec<TileRange>,
    range_idx: usize,
    x: u32,
    y: u32,
}

impl TileIter {
    pub fn new(bounds: &Bounds, zooms: &[u8]) -> Result<Self, BoundsError> {
        Ok(Self::from_ranges(tile_ranges(bounds, zooms)?))
    }

    #[must_use]
    pub fn from_ranges(ranges: Vec<TileRange>) -> Self {
        let (x, y) = ranges.first().map_or((0, 0), |r| (r.min_x, r.min_y));
        Self {
            ranges,
            range_idx: 0,
            x,
            y,
        }
    }

    fn remaining(&self) -> u64 {
        let Some(current) = self.ranges.get(self.range_idx) else {
            return 0;
        };
        let in_current = if self.y > current.max_y {
            0
        } else {
            let full_rows = u64::from(current.max_y - self.y);
            let row_width = u64::from(current.max_x - current.min_x + 1);
            full_rows * row_width + u64::from(current.max_x - self.x + 1)
        };
        in_current
            + self.ranges[self.range_idx + 1..]
                .iter()
                .map(TileRange::size)
                .sum::<u64>()
    }
}

impl Iterator for TileIter {
    type Item = TileCoord;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let range = self.ranges.get(self.range_idx)?;
            if self.y > range.max_y {
                self.range_idx += 1;
                if let Some(next) = self.ranges.get(self.range_idx) {
                    self.x = next.min_x;
                    self.y = next.min_y;
                }
                continue;
            }

            let tile = TileCoord {
                z: range.zoom,
                x: self.x,
                y: self.y,
            };
            if self.x == range.max_x {
                self.x = range.min_x;
                self.y += 1;
            } else {
                self.x += 1;
            }
            return Some(tile);
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl FusedIterator for TileIter {}

/// Calls `consumer` for every tile covering `bounds` at each of `zooms`.
///
/// Nothing is materialized: tiles are produced one at a time.
/// The first error returned by the consumer stops the enumeration and is returned.
pub fn generate_tiles<E, F>(bounds: &Bounds, zooms: &[u8], mut consumer: F) -> Result<(), E>
where
    E: From<BoundsError>,
    F: FnMut(TileCoord) -> Result<(), E>,
{
    for tile in TileIter::new(bounds, zooms)? {
        consumer(tile)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use rstest::rstest;

    use super::*;
    use crate::tiles_per_side;

    fn collect(bounds: &Bounds, zooms: &[u8]) -> Vec<TileCoord> {
        TileIter::new(bounds, zooms).unwrap().collect()
    }

    #[rstest]
    #[case(&[0], 1)]
    #[case(&[0, 1, 2], 21)]
    #[case(&[2, 0, 1, 1, 2], 21)]
    #[case(&[5], 1024)]
    fn test_world_counts(#[case] zooms: &[u8], #[case] expected: usize) {
        let tiles = collect(&Bounds::MAX, zooms);
        assert_eq!(tiles.len(), expected);
        let iter = TileIter::new(&Bounds::MAX, zooms).unwrap();
        assert_eq!(iter.size_hint(), (expected, Some(expected)));
        let total: u64 = tile_ranges(&Bounds::MAX, zooms)
            .unwrap()
            .iter()
            .map(TileRange::size)
            .sum();
        assert_eq!(total, expected as u64);
    }

    #[test]
    fn test_order() {
        let tiles = collect(&Bounds::MAX, &[1, 0]);
        let text = tiles
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        assert_snapshot!(text, @"0/0/0 1/0/0 1/1/0 1/0/1 1/1/1");
    }

    #[test]
    fn test_degenerate_box() {
        let point = Bounds::new(2.35, 48.85, 2.35, 48.85);
        let tiles = collect(&point, &[0, 4, 12]);
        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[1], TileCoord { z: 4, x: 8, y: 5 });
        assert_eq!(tiles[2], TileCoord { z: 12, x: 2074, y: 1409 });
    }

    #[test]
    fn test_tiles_intersect_bounds() {
        let bounds = Bounds::new(-122.52, 37.70, -122.35, 37.83);
        for zoom in [0_u8, 3, 8, 12, 14] {
            let tiles = collect(&bounds, &[zoom]);
            assert!(!tiles.is_empty());
            for tile in tiles {
                assert!(tile.x < tiles_per_side(zoom) && tile.y < tiles_per_side(zoom));
                let tb = tile.bounds();
                assert!(tb.left <= bounds.right && tb.right >= bounds.left, "{tile}");
                assert!(tb.bottom <= bounds.top && tb.top >= bounds.bottom, "{tile}");
            }
        }
    }

    #[test]
    fn test_clone_continues() {
        let mut iter = TileIter::new(&Bounds::MAX, &[1]).unwrap();
        iter.next();
        let rest: Vec<_> = iter.clone().collect();
        assert_eq!(rest.len(), 3);
        assert_eq!(iter.count(), 3);
    }

    #[test]
    fn test_generate_tiles_stops_on_error() {
        let mut seen = 0;
        let result: Result<(), BoundsError> = generate_tiles(&Bounds::MAX, &[0, 1, 2], |tile| {
            seen += 1;
            if tile.z == 1 {
                Err(BoundsError::InvalidZoom(tile.z))
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err(BoundsError::InvalidZoom(1)));
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_invalid_input() {
        assert_eq!(
            tile_ranges(&Bounds::MAX, &[3, 31]).unwrap_err(),
            BoundsError::InvalidZoom(31)
        );
        let inverted = Bounds::new(0.0, 10.0, 1.0, 5.0);
        assert!(matches!(
            TileIter::new(&inverted, &[0]),
            Err(BoundsError::InvertedLatitudes { .. })
        ));
        assert_eq!(collect(&Bounds::MAX, &[]).len(), 0);
    }
}
