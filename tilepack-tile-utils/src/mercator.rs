use std::f64::consts::PI;

use tilejson::Bounds;

use crate::{MAX_ZOOM, tiles_per_side};

/// Latitude limit of the square web-Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_6;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BoundsError {
    #[error("Bounds must be four comma-separated numbers in south,west,north,east order, got '{0}'")]
    InvalidFormat(String),

    #[error("Longitude {0} is outside of the -180..180 range")]
    InvalidLongitude(f64),

    #[error("Latitude {0} is outside of the -90..90 range")]
    InvalidLatitude(f64),

    #[error("South latitude {south} is greater than north latitude {north}")]
    InvertedLatitudes { south: f64, north: f64 },

    #[error("West longitude {west} is greater than east longitude {east}; boxes crossing the antimeridian are not supported")]
    CrossesAntimeridian { west: f64, east: f64 },

    #[error("Zoom level {0} is greater than the maximum zoom {max}", max = MAX_ZOOM)]
    InvalidZoom(u8),
}

/// Parses user input in `south,west,north,east` order and validates it.
pub fn parse_swne(value: &str) -> Result<Bounds, BoundsError> {
    let parts = value
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| BoundsError::InvalidFormat(value.to_string()))?;
    let [south, west, north, east] = parts[..] else {
        return Err(BoundsError::InvalidFormat(value.to_string()));
    };
    let bounds = Bounds::new(west, south, east, north);
    check_bounds(&bounds)?;
    Ok(bounds)
}

pub fn check_bounds(bounds: &Bounds) -> Result<(), BoundsError> {
    for lng in [bounds.left, bounds.right] {
        if !(-180.0..=180.0).contains(&lng) {
            return Err(BoundsError::InvalidLongitude(lng));
        }
    }
    for lat in [bounds.bottom, bounds.top] {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(BoundsError::InvalidLatitude(lat));
        }
    }
    if bounds.bottom > bounds.top {
        return Err(BoundsError::InvertedLatitudes {
            south: bounds.bottom,
            north: bounds.top,
        });
    }
    if bounds.left > bounds.right {
        return Err(BoundsError::CrossesAntimeridian {
            west: bounds.left,
            east: bounds.right,
        });
    }
    Ok(())
}

/// Smallest box containing both inputs.
#[must_use]
pub fn union_bounds(a: &Bounds, b: &Bounds) -> Bounds {
    Bounds::new(
        a.left.min(b.left),
        a.bottom.min(b.bottom),
        a.right.max(b.right),
        a.top.max(b.top),
    )
}

/// Midpoint of the box as `(lng, lat)`.
#[must_use]
pub fn bounds_center(bounds: &Bounds) -> (f64, f64) {
    (
        (bounds.left + bounds.right) / 2.0,
        (bounds.bottom + bounds.top) / 2.0,
    )
}

/// Column and row (XYZ) of the tile containing the given point.
///
/// Latitudes are clamped to [`MAX_LATITUDE`], and the result is clamped to the grid,
/// so the east and south edges of the world map to the last column and row.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
pub fn tile_index(lng: f64, lat: f64, zoom: u8) -> (u32, u32) {
    let n = f64::from(tiles_per_side(zoom));
    let max = tiles_per_side(zoom) - 1;
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();

    let x = (lng + 180.0) / 360.0 * n;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * n;

    let col = (x.floor().max(0.0) as u32).min(max);
    let row = (y.floor().max(0.0) as u32).min(max);
    (col, row)
}

/// Longitude of the west edge of column `x`.
#[must_use]
pub fn tile_lng(x: u32, zoom: u8) -> f64 {
    f64::from(x) / f64::from(tiles_per_side(zoom)) * 360.0 - 180.0
}

/// Latitude of the north edge of row `y` (XYZ).
#[must_use]
pub fn tile_lat(y: u32, zoom: u8) -> f64 {
    let n = PI * (1.0 - 2.0 * f64::from(y) / f64::from(tiles_per_side(zoom)));
    n.sinh().atan().to_degrees()
}

/// Convert an inclusive range of XYZ tiles to the box they cover.
#[must_use]
pub fn xyz_to_bbox(zoom: u8, min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Bounds {
    Bounds::new(
        tile_lng(min_x, zoom),
        tile_lat(max_y + 1, zoom),
        tile_lng(max_x + 1, zoom),
        tile_lat(min_y, zoom),
    )
}

/// Inclusive `(min_x, min_y, max_x, max_y)` range of XYZ tiles covering the box.
#[must_use]
pub fn bbox_to_xyz(bounds: &Bounds, zoom: u8) -> (u32, u32, u32, u32) {
    let (min_x, min_y) = tile_index(bounds.left, bounds.top, zoom);
    let (max_x, max_y) = tile_index(bounds.right, bounds.bottom, zoom);
    (min_x, min_y, max_x, max_y)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unreadable_literal)]

    use approx::assert_relative_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, -180.0, 90.0, (0, 0))]
    #[case(0, 180.0, -90.0, (0, 0))]
    #[case(1, 180.0, -90.0, (1, 1))]
    #[case(1, -0.1, 0.1, (0, 0))]
    #[case(1, 0.1, -0.1, (1, 1))]
    #[case(2, -74.0, 40.7, (1, 1))]
    #[case(10, -122.4194, 37.7749, (163, 395))]
    fn test_tile_index(
        #[case] zoom: u8,
        #[case] lng: f64,
        #[case] lat: f64,
        #[case] expected: (u32, u32),
    ) {
        assert_eq!(tile_index(lng, lat, zoom), expected);
    }

    #[test]
    fn test_tile_edges() {
        assert_relative_eq!(tile_lng(0, 3), -180.0);
        assert_relative_eq!(tile_lng(8, 3), 180.0);
        assert_relative_eq!(tile_lat(0, 0), MAX_LATITUDE, epsilon = 1e-9);
        assert_relative_eq!(tile_lat(1, 0), -MAX_LATITUDE, epsilon = 1e-9);
        assert_relative_eq!(tile_lat(1, 1), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_xyz_to_bbox() {
        let world = xyz_to_bbox(0, 0, 0, 0, 0);
        assert_relative_eq!(world.left, -180.0);
        assert_relative_eq!(world.right, 180.0);
        assert_relative_eq!(world.bottom, -MAX_LATITUDE, epsilon = 1e-9);
        assert_relative_eq!(world.top, MAX_LATITUDE, epsilon = 1e-9);

        let nw = xyz_to_bbox(1, 0, 0, 0, 0);
        assert_relative_eq!(nw.left, -180.0);
        assert_relative_eq!(nw.right, 0.0);
        assert_relative_eq!(nw.bottom, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bbox_to_xyz() {
        assert_eq!(bbox_to_xyz(&Bounds::MAX, 2), (0, 0, 3, 3));
        let bounds = Bounds::new(-1.0, -1.0, 1.0, 1.0);
        assert_eq!(bbox_to_xyz(&bounds, 1), (0, 0, 1, 1));
        assert_eq!(bbox_to_xyz(&bounds, 3), (3, 3, 4, 4));
    }

    #[test]
    fn test_parse_swne() {
        let bounds = parse_swne("37.7, -122.5, 37.8, -122.3").unwrap();
        assert_eq!(bounds, Bounds::new(-122.5, 37.7, -122.3, 37.8));
        assert_eq!(parse_swne("-90,-180,90,180").unwrap(), Bounds::MAX);
    }

    #[rstest]
    #[case("1,2,3", BoundsError::InvalidFormat("1,2,3".to_string()))]
    #[case("a,b,c,d", BoundsError::InvalidFormat("a,b,c,d".to_string()))]
    #[case("0,-190,1,1", BoundsError::InvalidLongitude(-190.0))]
    #[case("0,0,91,1", BoundsError::InvalidLatitude(91.0))]
    #[case("10,0,5,1", BoundsError::InvertedLatitudes { south: 10.0, north: 5.0 })]
    #[case("0,170,1,-170", BoundsError::CrossesAntimeridian { west: 170.0, east: -170.0 })]
    fn test_parse_swne_errors(#[case] value: &str, #[case] expected: BoundsError) {
        assert_eq!(parse_swne(value).unwrap_err(), expected);
    }

    #[test]
    fn test_union_and_center() {
        let a = Bounds::new(-10.0, -5.0, 0.0, 5.0);
        let b = Bounds::new(-2.0, 0.0, 20.0, 15.0);
        let union = union_bounds(&a, &b);
        assert_eq!(union, Bounds::new(-10.0, -5.0, 20.0, 15.0));
        assert_eq!(bounds_center(&union), (5.0, 5.0));
    }
}
