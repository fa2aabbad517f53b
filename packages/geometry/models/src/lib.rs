#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Viewport, filter, and query parameter types for OSM feature exploration.
//!
//! These are the immutable values exchanged between the coordinate
//! normalizer, the spatial query builder, the result cache, and the view
//! state machine. Styled features live in `osm_explorer_style` since only
//! the styling engine is allowed to construct them.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Property key holding the feature name in store documents.
pub const NAME_PROPERTY: &str = "NAME";

/// Property key holding the (truncated) raw OSM tag string.
pub const TAGS_PROPERTY: &str = "TAGS";

/// Property key holding the OSM object ID.
pub const OSM_ID_PROPERTY: &str = "OSM_ID";

/// Default maximum number of rows requested per query.
pub const DEFAULT_ROW_CAP: u32 = 1000;

/// Default attribute column selected on first render.
pub const DEFAULT_COLUMN: &str = "ACCESS";

/// Scale applied to coordinates when deriving integer cache keys
/// (1e-7 degrees, roughly one centimeter).
const KEY_SCALE: f64 = 10_000_000.0;

/// The three OSM geometry tables.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum GeometryKind {
    /// Nodes (`planet_osm_point`).
    Point,
    /// Open ways (`planet_osm_line`).
    Line,
    /// Closed ways and multipolygon relations (`planet_osm_polygon`).
    Polygon,
}

impl GeometryKind {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Point, Self::Line, Self::Polygon]
    }

    /// Lowercase suffix used in physical table and file names.
    #[must_use]
    pub const fn table_suffix(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Line => "line",
            Self::Polygon => "polygon",
        }
    }

    /// Physical warehouse table name, e.g. `PLANET_OSM_POINT`.
    #[must_use]
    pub const fn table_name(self) -> &'static str {
        match self {
            Self::Point => "PLANET_OSM_POINT",
            Self::Line => "PLANET_OSM_LINE",
            Self::Polygon => "PLANET_OSM_POLYGON",
        }
    }
}

/// A WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl LatLng {
    /// Creates a new coordinate pair.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Error returned when a [`BoundingRectangle`] would violate its invariants.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidRectangleError {
    /// One of the edges is NaN or infinite.
    #[error("rectangle edge is not a finite number")]
    NonFinite,
    /// West is east of east, or south is north of north.
    #[error("inverted rectangle: west={west} south={south} east={east} north={north}")]
    Inverted {
        /// Western edge.
        west: f64,
        /// Southern edge.
        south: f64,
        /// Eastern edge.
        east: f64,
        /// Northern edge.
        north: f64,
    },
}

/// A west/south/east/north rectangle in degrees (`x1, y1, x2, y2`).
///
/// Always satisfies `west <= east` and `south <= north`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingRectangle {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

impl BoundingRectangle {
    /// Creates a rectangle from its four edges.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRectangleError`] if an edge is not finite or the
    /// edges are inverted.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self, InvalidRectangleError> {
        if ![west, south, east, north].iter().all(|v| v.is_finite()) {
            return Err(InvalidRectangleError::NonFinite);
        }
        if west > east || south > north {
            return Err(InvalidRectangleError::Inverted {
                west,
                south,
                east,
                north,
            });
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    /// Creates the smallest rectangle spanning two corners, in any order.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRectangleError::NonFinite`] if a coordinate is not
    /// finite.
    pub fn from_corners(a: LatLng, b: LatLng) -> Result<Self, InvalidRectangleError> {
        Self::new(
            a.lng.min(b.lng),
            a.lat.min(b.lat),
            a.lng.max(b.lng),
            a.lat.max(b.lat),
        )
    }

    /// Western longitude (`x1`).
    #[must_use]
    pub const fn west(&self) -> f64 {
        self.west
    }

    /// Southern latitude (`y1`).
    #[must_use]
    pub const fn south(&self) -> f64 {
        self.south
    }

    /// Eastern longitude (`x2`).
    #[must_use]
    pub const fn east(&self) -> f64 {
        self.east
    }

    /// Northern latitude (`y2`).
    #[must_use]
    pub const fn north(&self) -> f64 {
        self.north
    }

    /// Whether `other` lies entirely inside (or on the edge of) this rectangle.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        self.west <= other.west
            && self.south <= other.south
            && self.east >= other.east
            && self.north >= other.north
    }

    /// Midpoint of the rectangle.
    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng::new(
            f64::midpoint(self.south, self.north),
            f64::midpoint(self.west, self.east),
        )
    }

    /// The closed `(lng, lat)` ring SW, SE, NE, NW, SW.
    #[must_use]
    pub const fn ring(&self) -> [(f64, f64); 5] {
        [
            (self.west, self.south),
            (self.east, self.south),
            (self.east, self.north),
            (self.west, self.north),
            (self.west, self.south),
        ]
    }

    /// Integer key of the edges, used for hashing and ordering.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn grid_key(&self) -> [i64; 4] {
        [self.west, self.south, self.east, self.north].map(|v| (v * KEY_SCALE).round() as i64)
    }
}

/// The map viewport as held by the view state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewportState {
    /// Canonical (normalized) query rectangle.
    pub rectangle: BoundingRectangle,
    /// Map zoom level.
    pub zoom: u8,
    /// Map center.
    pub center: LatLng,
}

/// Error returned for column names that are not plain identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid attribute column name: {name:?}")]
pub struct InvalidAttributeNameError {
    /// The rejected name.
    pub name: String,
}

/// An OSM attribute column such as `ACCESS` or `AMENITY`.
///
/// Names are ASCII identifiers, stored upper-case, so they can be spliced
/// into store queries as identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AttributeName(String);

impl AttributeName {
    /// Validates and canonicalizes a column name.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidAttributeNameError`] if the name is empty, longer
    /// than 63 characters, or not of the form `[A-Za-z_][A-Za-z0-9_]*`.
    pub fn new(name: impl AsRef<str>) -> Result<Self, InvalidAttributeNameError> {
        let name = name.as_ref().trim();
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if !valid_start || !valid_rest || name.len() > 63 {
            return Err(InvalidAttributeNameError {
                name: name.to_string(),
            });
        }

        Ok(Self(name.to_ascii_uppercase()))
    }

    /// Returns the canonical upper-case name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AttributeName {
    fn default() -> Self {
        Self(DEFAULT_COLUMN.to_string())
    }
}

impl fmt::Display for AttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AttributeName {
    type Err = InvalidAttributeNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AttributeName {
    type Error = InvalidAttributeNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AttributeName> for String {
    fn from(value: AttributeName) -> Self {
        value.0
    }
}

impl AsRef<str> for AttributeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A set of selected attribute values. Sorted, so keys built from it are
/// independent of selection order.
pub type TagSet = BTreeSet<String>;

/// Control panel selections that, together with a rectangle, determine a
/// query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    /// Geometry table to query.
    pub table: GeometryKind,
    /// Attribute column to color by.
    pub column: AttributeName,
    /// Attribute values to keep. `None` (or an empty set) keeps everything.
    #[serde(default)]
    pub tags: Option<TagSet>,
    /// Maximum number of rows to request.
    pub row_cap: u32,
}

impl Filters {
    /// Returns the filters with an empty tag set collapsed to `None`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.tags.as_ref().is_some_and(BTreeSet::is_empty) {
            self.tags = None;
        }
        self
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            table: GeometryKind::Point,
            column: AttributeName::default(),
            tags: None,
            row_cap: DEFAULT_ROW_CAP,
        }
    }
}

/// The full parameter tuple of one spatial query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameters {
    /// Geometry table to query.
    pub table: GeometryKind,
    /// Attribute column to fetch and color by.
    pub column: AttributeName,
    /// Attribute values to restrict to, never `Some(empty)`.
    pub tags: Option<TagSet>,
    /// Maximum number of rows.
    pub row_cap: u32,
    /// Canonical query rectangle.
    pub rectangle: BoundingRectangle,
}

impl QueryParameters {
    /// Combines control panel selections with a canonical rectangle.
    #[must_use]
    pub fn new(filters: &Filters, rectangle: BoundingRectangle) -> Self {
        let filters = filters.clone().normalized();
        Self {
            table: filters.table,
            column: filters.column,
            tags: filters.tags,
            row_cap: filters.row_cap,
            rectangle,
        }
    }

    /// The cache key for these parameters.
    #[must_use]
    pub fn key(&self) -> QueryKey {
        QueryKey {
            rectangle: self.rectangle.grid_key(),
            table: self.table,
            column: self.column.clone(),
            tags: self
                .tags
                .as_ref()
                .map(|tags| tags.iter().cloned().collect())
                .unwrap_or_default(),
            row_cap: self.row_cap,
        }
    }
}

/// Hashable, totally ordered identity of a [`QueryParameters`] value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey {
    rectangle: [i64; 4],
    table: GeometryKind,
    column: AttributeName,
    tags: Vec<String>,
    row_cap: u32,
}

/// One raw result row: a feature as returned by the geometry store,
/// before styling.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    /// Feature name (never null in store results).
    pub name: String,
    /// Value of the selected attribute column.
    pub attribute_value: String,
    /// The feature geometry.
    pub geometry: geojson::Geometry,
    /// Raw OSM tag string, truncated by the store.
    pub tags: Option<String>,
    /// OSM object ID.
    pub osm_id: Option<i64>,
}

impl FeatureRow {
    /// Creates a row from its name, attribute value, and geometry.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        attribute_value: impl Into<String>,
        geometry: geojson::Geometry,
    ) -> Self {
        Self {
            name: name.into(),
            attribute_value: attribute_value.into(),
            geometry,
            tags: None,
            osm_id: None,
        }
    }

    /// Extracts a row from a store feature.
    ///
    /// Returns `None` if the geometry, the name, or the attribute value is
    /// missing.
    #[must_use]
    pub fn from_feature(feature: &geojson::Feature, column: &AttributeName) -> Option<Self> {
        let geometry = feature.geometry.clone()?;
        let properties = feature.properties.as_ref()?;

        Some(Self {
            name: property_string(properties, NAME_PROPERTY)?,
            attribute_value: property_string(properties, column.as_str())?,
            geometry,
            tags: property_string(properties, TAGS_PROPERTY),
            osm_id: properties.get(OSM_ID_PROPERTY).and_then(|v| {
                v.as_i64()
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            }),
        })
    }

    /// Extracts all well-formed rows from a store document, in order.
    #[must_use]
    pub fn rows_from_collection(
        collection: &geojson::FeatureCollection,
        column: &AttributeName,
    ) -> Vec<Self> {
        let rows: Vec<Self> = collection
            .features
            .iter()
            .filter_map(|feature| Self::from_feature(feature, column))
            .collect();

        let skipped = collection.features.len() - rows.len();
        if skipped > 0 {
            log::warn!("Skipped {skipped} store feature(s) without name, {column}, or geometry");
        }

        rows
    }
}

/// Reads a scalar property as a string; `null` and missing keys are `None`.
#[must_use]
pub fn property_string(properties: &geojson::JsonObject, key: &str) -> Option<String> {
    match properties.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
