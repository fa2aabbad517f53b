//! Web Mercator (EPSG:3857) helpers for deriving the rectangle a map widget
//! shows at a given center and zoom.
//!
//! Coordinates are expressed in "world pixels": at zoom 0 the whole world is
//! one 256x256 tile, and every zoom level doubles both dimensions.

use std::f64::consts::PI;

use osm_explorer_geometry_models::{BoundingRectangle, InvalidRectangleError, LatLng};

/// Edge length of one map tile in pixels.
const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the Web Mercator projection.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Projects a coordinate to zoom-0 world pixels.
#[must_use]
pub fn to_world(point: LatLng) -> (f64, f64) {
    let lat = point.lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (point.lng + 180.0) / 360.0 * TILE_SIZE;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * TILE_SIZE;
    (x, y)
}

/// Inverse of [`to_world`].
#[must_use]
pub fn from_world(x: f64, y: f64) -> LatLng {
    let lng = x / TILE_SIZE * 360.0 - 180.0;
    let n = PI * (1.0 - 2.0 * y / TILE_SIZE);
    let lat = n.sinh().atan().to_degrees();
    LatLng::new(lat, lng)
}

/// The rectangle visible in a `width` x `height` pixel map centered on
/// `center` at `zoom`.
///
/// # Errors
///
/// Returns [`InvalidRectangleError`] if `center` is not finite.
pub fn viewport_rectangle(
    center: LatLng,
    zoom: u8,
    width: u32,
    height: u32,
) -> Result<BoundingRectangle, InvalidRectangleError> {
    let scale = 2f64.powi(i32::from(zoom.min(30)));
    let (x, y) = to_world(center);
    let half_width = f64::from(width) / 2.0 / scale;
    let half_height = f64::from(height) / 2.0 / scale;

    let world = TILE_SIZE;
    let south_west = from_world(
        (x - half_width).clamp(0.0, world),
        (y + half_height).clamp(0.0, world),
    );
    let north_east = from_world(
        (x + half_width).clamp(0.0, world),
        (y - half_height).clamp(0.0, world),
    );

    BoundingRectangle::from_corners(south_west, north_east)
}
