#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Viewport bounds parsing and quantization.
//!
//! Map widgets report their bounds as nested JSON
//! (`{"_southWest": {"lat", "lng"}, "_northEast": {...}}`) on every
//! interaction, with sub-pixel jitter between reports of the same view.
//! [`Normalizer::normalize`] turns such a report into a canonical
//! [`BoundingRectangle`] snapped outward onto a decimal grid, so that
//! jittered reports collapse onto one cache key and the query area always
//! covers the visible area.

pub mod mercator;

use osm_explorer_geometry_models::{BoundingRectangle, InvalidRectangleError, LatLng};
use serde_json::Value;

/// Center used before the map widget has reported anything.
pub const DEFAULT_CENTER: LatLng = LatLng::new(39.8, -86.1);

/// Zoom used before the map widget has reported anything.
pub const DEFAULT_ZOOM: u8 = 4;

/// South-west corner of the initial North America view.
pub const DEFAULT_SOUTH_WEST: LatLng = LatLng::new(10.314_919_285_813_16, -140.097_656_250_000_03);

/// North-east corner of the initial North America view.
pub const DEFAULT_NORTH_EAST: LatLng = LatLng::new(58.170_702_483_486_09, -52.207_031_250_000_01);

/// Default number of decimal places kept in canonical rectangles.
pub const DEFAULT_PRECISION: u32 = 2;

/// Distance from a grid line, in grid units, below which an edge counts as
/// already on the grid. Absorbs float noise from JSON round trips.
const GRID_TOLERANCE: f64 = 1e-6;

/// Errors raised while reading a raw bounds report.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MalformedBoundsError {
    /// A required key is absent.
    #[error("bounds are missing `{path}`")]
    MissingKey {
        /// Dotted path of the missing key.
        path: String,
    },
    /// A coordinate is not a finite number.
    #[error("bounds value at `{path}` is not numeric: {value}")]
    NotNumeric {
        /// Dotted path of the offending value.
        path: String,
        /// The offending value, rendered as JSON.
        value: String,
    },
    /// The coordinates do not form a valid rectangle.
    #[error(transparent)]
    Rectangle(#[from] InvalidRectangleError),
}

/// Reads the two corners of a raw bounds object into a rectangle, without
/// quantizing.
///
/// Both Leaflet's underscored keys (`_southWest`) and plain keys
/// (`southWest`) are accepted. Coordinates may be JSON numbers or numeric
/// strings.
///
/// # Errors
///
/// Returns [`MalformedBoundsError`] if a corner or coordinate is missing or
/// not numeric.
pub fn parse_bounds(raw: &Value) -> Result<BoundingRectangle, MalformedBoundsError> {
    let south_west = corner(raw, "southWest")?;
    let north_east = corner(raw, "northEast")?;
    Ok(BoundingRectangle::from_corners(south_west, north_east)?)
}

fn corner(raw: &Value, name: &str) -> Result<LatLng, MalformedBoundsError> {
    let value = raw
        .get(format!("_{name}").as_str())
        .or_else(|| raw.get(name))
        .ok_or_else(|| MalformedBoundsError::MissingKey {
            path: name.to_string(),
        })?;

    Ok(LatLng::new(
        coordinate(value, name, "lat")?,
        coordinate(value, name, "lng")?,
    ))
}

fn coordinate(corner: &Value, corner_name: &str, axis: &str) -> Result<f64, MalformedBoundsError> {
    let path = format!("{corner_name}.{axis}");
    let value = corner
        .get(axis)
        .ok_or_else(|| MalformedBoundsError::MissingKey { path: path.clone() })?;

    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .filter(|n| n.is_finite())
        .ok_or_else(|| MalformedBoundsError::NotNumeric {
            path,
            value: value.to_string(),
        })
}

/// Center of a map widget report (`{"bounds": {...}, ...}`).
///
/// Falls back to [`DEFAULT_CENTER`] when there is no report yet or its
/// bounds are unusable. Never fails.
#[must_use]
pub fn get_center(report: Option<&Value>) -> LatLng {
    report
        .and_then(|r| r.get("bounds"))
        .and_then(|bounds| parse_bounds(bounds).ok())
        .map_or(DEFAULT_CENTER, |rect| rect.center())
}

/// The initial North America view as an unquantized rectangle.
#[must_use]
pub fn default_rectangle() -> BoundingRectangle {
    BoundingRectangle::from_corners(DEFAULT_SOUTH_WEST, DEFAULT_NORTH_EAST)
        .unwrap_or_else(|_| unreachable!("default corners are finite"))
}

/// Quantizes rectangles onto a decimal grid of fixed precision.
///
/// Each edge is rounded to the grid and then moved one grid unit outward
/// (west/south down, east/north up). Edges that already lie on the grid are
/// kept, which makes [`Normalizer::quantize`] idempotent; the outward move
/// guarantees the result contains the input (up to float noise).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    precision: u32,
    scale: f64,
}

impl Normalizer {
    /// Creates a normalizer keeping `precision` decimal places.
    #[must_use]
    pub fn new(precision: u32) -> Self {
        let precision = precision.min(9);
        #[allow(clippy::cast_possible_wrap)]
        let scale = 10f64.powi(precision as i32);
        Self { precision, scale }
    }

    /// Number of decimal places kept.
    #[must_use]
    pub const fn precision(&self) -> u32 {
        self.precision
    }

    /// Size of one grid unit in degrees.
    #[must_use]
    pub fn unit(&self) -> f64 {
        1.0 / self.scale
    }

    /// Parses and quantizes a raw bounds object.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedBoundsError`] if the bounds cannot be parsed.
    pub fn normalize(&self, raw: &Value) -> Result<BoundingRectangle, MalformedBoundsError> {
        let rect = parse_bounds(raw)?;
        Ok(self.quantize(&rect))
    }

    /// Snaps a rectangle outward onto the grid, clamped to valid WGS84
    /// ranges.
    #[must_use]
    pub fn quantize(&self, rect: &BoundingRectangle) -> BoundingRectangle {
        let west = self.snap_down(rect.west()).clamp(-180.0, 180.0);
        let south = self.snap_down(rect.south()).clamp(-90.0, 90.0);
        let east = self.snap_up(rect.east()).clamp(-180.0, 180.0);
        let north = self.snap_up(rect.north()).clamp(-90.0, 90.0);

        if west < rect.west() || south < rect.south() || east > rect.east() || north > rect.north()
        {
            log::trace!(
                "Snapped [{}, {}, {}, {}] outward to [{west}, {south}, {east}, {north}]",
                rect.west(),
                rect.south(),
                rect.east(),
                rect.north()
            );
        }

        // Snapping and clamping are monotone, so the edges stay ordered.
        BoundingRectangle::new(west, south, east, north).unwrap_or(*rect)
    }

    fn snap_down(&self, value: f64) -> f64 {
        let scaled = value * self.scale;
        let rounded = scaled.round();
        if (scaled - rounded).abs() < GRID_TOLERANCE {
            rounded / self.scale
        } else {
            (rounded - 1.0) / self.scale
        }
    }

    fn snap_up(&self, value: f64) -> f64 {
        let scaled = value * self.scale;
        let rounded = scaled.round();
        if (scaled - rounded).abs() < GRID_TOLERANCE {
            rounded / self.scale
        } else {
            (rounded + 1.0) / self.scale
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PRECISION)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bounds(south: f64, west: f64, north: f64, east: f64) -> Value {
        json!({
            "_southWest": { "lat": south, "lng": west },
            "_northEast": { "lat": north, "lng": east },
        })
    }

    fn as_bounds(rect: &BoundingRectangle) -> Value {
        bounds(rect.south(), rect.west(), rect.north(), rect.east())
    }

    #[test]
    fn parses_leaflet_and_plain_keys() {
        let leaflet = parse_bounds(&bounds(10.0, -140.0, 58.0, -52.0)).unwrap();
        let plain = parse_bounds(&json!({
            "southWest": { "lat": 10.0, "lng": -140.0 },
            "northEast": { "lat": 58.0, "lng": -52.0 },
        }))
        .unwrap();

        assert_eq!(leaflet, plain);
        assert_eq!(leaflet.west(), -140.0);
        assert_eq!(leaflet.north(), 58.0);
    }

    #[test]
    fn accepts_numeric_strings() {
        let rect = parse_bounds(&json!({
            "_southWest": { "lat": "10.5", "lng": "-140" },
            "_northEast": { "lat": 58, "lng": -52 },
        }))
        .unwrap();
        assert_eq!(rect.south(), 10.5);
    }

    #[test]
    fn missing_corner_is_malformed() {
        let err = parse_bounds(&json!({ "_southWest": { "lat": 1.0, "lng": 2.0 } })).unwrap_err();
        assert_eq!(
            err,
            MalformedBoundsError::MissingKey {
                path: "northEast".to_string()
            }
        );
    }

    #[test]
    fn missing_axis_is_malformed() {
        let err = parse_bounds(&json!({
            "_southWest": { "lat": 1.0 },
            "_northEast": { "lat": 2.0, "lng": 3.0 },
        }))
        .unwrap_err();
        assert!(matches!(err, MalformedBoundsError::MissingKey { ref path } if path == "southWest.lng"));
    }

    #[test]
    fn non_numeric_is_malformed() {
        let err = parse_bounds(&json!({
            "_southWest": { "lat": "north-ish", "lng": 2.0 },
            "_northEast": { "lat": 2.0, "lng": 3.0 },
        }))
        .unwrap_err();
        assert!(matches!(err, MalformedBoundsError::NotNumeric { .. }));

        assert!(parse_bounds(&Value::Null).is_err());
    }

    #[test]
    fn normalize_expands_outward_one_unit() {
        let normalizer = Normalizer::new(1);
        let rect = normalizer
            .normalize(&bounds(10.314, -140.097, 58.171, -52.207))
            .unwrap();

        assert!((rect.south() - 10.2).abs() < 1e-9);
        assert!((rect.west() - -140.2).abs() < 1e-9);
        assert!((rect.north() - 58.3).abs() < 1e-9);
        assert!((rect.east() - -52.1).abs() < 1e-9);
    }

    #[test]
    fn normalized_rectangle_contains_input_and_is_idempotent() {
        let normalizer = Normalizer::new(2);

        for i in 0..200u32 {
            let jitter = f64::from(i) * 0.000_731;
            let raw = bounds(
                10.3 + jitter,
                -140.09 - jitter,
                58.17 + jitter * 0.5,
                -52.2 + jitter,
            );
            let input = parse_bounds(&raw).unwrap();
            let once = normalizer.normalize(&raw).unwrap();
            let twice = normalizer.normalize(&as_bounds(&once)).unwrap();

            assert!(once.contains(&input), "{once:?} does not contain {input:?}");
            assert_eq!(once, twice, "normalize not idempotent for {input:?}");
        }
    }

    #[test]
    fn jittered_reports_share_a_key() {
        let normalizer = Normalizer::new(2);
        let a = normalizer
            .normalize(&bounds(39.700_001, -86.200_003, 39.899_998, -85.999_999))
            .unwrap();
        let b = normalizer
            .normalize(&bounds(39.699_998, -86.199_997, 39.900_002, -86.000_004))
            .unwrap();

        assert_eq!(a.grid_key(), b.grid_key());
    }

    #[test]
    fn aligned_rectangle_is_left_alone() {
        let normalizer = Normalizer::new(2);
        let aligned = BoundingRectangle::new(-86.2, 39.7, -86.0, 39.9).unwrap();
        assert_eq!(normalizer.quantize(&aligned).grid_key(), aligned.grid_key());

        let raw = BoundingRectangle::new(-86.195, 39.7, -86.0, 39.9).unwrap();
        let widened = normalizer.quantize(&raw);
        assert!(widened.west() < -86.195);
        assert!((widened.south() - 39.7).abs() < 1e-9);
    }

    #[test]
    fn quantize_clamps_to_wgs84() {
        let normalizer = Normalizer::new(2);
        let rect = normalizer
            .normalize(&bounds(-89.999, -179.999, 89.999, 179.999))
            .unwrap();

        assert_eq!(rect.west(), -180.0);
        assert_eq!(rect.south(), -90.0);
        assert_eq!(rect.east(), 180.0);
        assert_eq!(rect.north(), 90.0);
    }

    #[test]
    fn center_defaults_when_unknown() {
        assert_eq!(get_center(None), DEFAULT_CENTER);
        assert_eq!(get_center(Some(&json!({ "zoom": 4 }))), DEFAULT_CENTER);
        assert_eq!(
            get_center(Some(&json!({ "bounds": { "_southWest": null } }))),
            DEFAULT_CENTER
        );
    }

    #[test]
    fn center_is_bounds_midpoint() {
        let report = json!({ "bounds": bounds(10.0, -100.0, 20.0, -80.0), "zoom": 6 });
        assert_eq!(get_center(Some(&report)), LatLng::new(15.0, -90.0));
    }

    #[test]
    fn default_rectangle_spans_north_america() {
        let rect = default_rectangle();
        assert!(rect.contains(&BoundingRectangle::new(-130.0, 20.0, -60.0, 50.0).unwrap()));
    }
}
