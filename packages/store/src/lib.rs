#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry store contract and implementations.
//!
//! A geometry store holds the three OSM tables (points, lines, polygons)
//! and answers one kind of spatial range query: "features of this kind
//! lying within this polygon, with a non-null name and attribute, optionally
//! restricted to some attribute values, capped at N rows". Each query is a
//! single round trip that yields a ready-to-render `GeoJSON` feature
//! collection.
//!
//! Two implementations are provided:
//!
//! * [`MemoryStore`]: `GeoJSON` files loaded into per-table R-trees.
//! * `DuckDbStore` (feature `duckdb`): a read-only `DuckDB` warehouse.

#[cfg(feature = "duckdb")]
pub mod duckdb_store;
pub mod memory;

use std::fmt::{self, Write as _};

use osm_explorer_geometry_models::{
    AttributeName, GeometryKind, LatLng, NAME_PROPERTY, OSM_ID_PROPERTY, TAGS_PROPERTY,
};

#[cfg(feature = "duckdb")]
pub use duckdb_store::DuckDbStore;
pub use memory::{MemoryStore, OsmRecord};

/// Maximum number of characters of the raw OSM tag string kept per feature.
pub const MAX_TAGS_LENGTH: usize = 512;

/// Attribute column marking administrative capitals.
pub const CAPITAL_COLUMN: &str = "CAPITAL";

/// `CAPITAL` value of state/province capitals.
pub const STATE_CAPITAL: &str = "4";

/// An error reported by a geometry store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Store error: {message}")]
pub struct StoreError {
    /// Description of what went wrong.
    pub message: String,
}

impl StoreError {
    /// Creates a store error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::new(format!("I/O error: {e}"))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("JSON error: {e}"))
    }
}

impl From<geojson::Error> for StoreError {
    fn from(e: geojson::Error) -> Self {
        Self::new(format!("GeoJSON error: {e}"))
    }
}

#[cfg(feature = "duckdb")]
impl From<duckdb::Error> for StoreError {
    fn from(e: duckdb::Error) -> Self {
        Self::new(format!("DuckDB error: {e}"))
    }
}

/// One spatial range query, as handed to a [`GeometryStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    /// Table to query.
    pub kind: GeometryKind,
    /// Closed polygon the features must lie within.
    pub bounding_polygon: geo::Polygon<f64>,
    /// Skip rows without a name.
    pub name_not_null: bool,
    /// Skip rows without a value in `column`.
    pub column_not_null: bool,
    /// Attribute column to return.
    pub column: AttributeName,
    /// Keep only rows whose `column` value is one of these.
    pub column_filter_values: Option<Vec<String>>,
    /// Maximum number of rows.
    pub limit: u32,
}

impl QueryDescriptor {
    /// The bounding polygon as WKT, e.g. `POLYGON((x1 y1, x2 y1, ...))`.
    #[must_use]
    pub fn bounding_polygon_wkt(&self) -> String {
        let coords: Vec<String> = self
            .bounding_polygon
            .exterior()
            .coords()
            .map(|c| format!("{} {}", c.x, c.y))
            .collect();
        format!("POLYGON(({}))", coords.join(", "))
    }

    /// The filter values, with an empty list treated as "no filter".
    #[must_use]
    pub fn filter_values(&self) -> Option<&[String]> {
        self.column_filter_values
            .as_deref()
            .filter(|values| !values.is_empty())
    }
}

/// Renders the descriptor as the equivalent warehouse SQL, for display.
impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let column = self.column.as_str();
        let mut sql = format!(
            "SELECT NAME, {column}, ST_ASGEOJSON(WAY)\nFROM {}\nWHERE ST_WITHIN(WAY, TO_GEOGRAPHY('{}'))",
            self.kind.table_name(),
            self.bounding_polygon_wkt(),
        );
        if self.name_not_null {
            sql.push_str("\n  AND NAME IS NOT NULL");
        }
        if self.column_not_null {
            write!(sql, "\n  AND {column} IS NOT NULL")?;
        }
        if let Some(values) = self.filter_values() {
            let quoted: Vec<String> = values
                .iter()
                .map(|v| format!("'{}'", v.replace('\'', "''")))
                .collect();
            write!(sql, "\n  AND {column} IN ({})", quoted.join(","))?;
        }
        write!(sql, "\nLIMIT {}", self.limit)?;
        f.write_str(&sql)
    }
}

/// A distinct attribute value and how often it occurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValueCount {
    /// The attribute value.
    pub value: String,
    /// Number of rows carrying it.
    pub count: u64,
}

/// A named point of interest the map can jump to.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkRecord {
    /// Display name.
    pub name: String,
    /// Location.
    pub location: LatLng,
}

/// A source of OSM features answering spatial range queries.
pub trait GeometryStore: Send + Sync {
    /// Runs one spatial range query and returns the aggregated document.
    ///
    /// Every feature carries the properties `NAME`, the requested column,
    /// `TAGS` (truncated to [`MAX_TAGS_LENGTH`]) and `OSM_ID`. Row order is
    /// store-defined.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot answer the query.
    fn feature_collection(
        &self,
        query: &QueryDescriptor,
    ) -> Result<geojson::FeatureCollection, StoreError>;

    /// Distinct non-null values of `column` occurring at least `min_count`
    /// times, most frequent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot answer the query.
    fn attribute_values(
        &self,
        kind: GeometryKind,
        column: &AttributeName,
        min_count: u64,
    ) -> Result<Vec<AttributeValueCount>, StoreError>;

    /// State capitals (points with `CAPITAL = '4'`), ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot answer the query.
    fn landmarks(&self) -> Result<Vec<LandmarkRecord>, StoreError>;
}

/// Truncates a raw tag string to [`MAX_TAGS_LENGTH`] characters.
#[must_use]
pub fn truncate_tags(tags: &str) -> String {
    tags.chars().take(MAX_TAGS_LENGTH).collect()
}

/// Builds the property object every store attaches to a feature.
#[must_use]
pub fn feature_properties(
    column: &AttributeName,
    name: Option<&str>,
    value: Option<&str>,
    tags: Option<&str>,
    osm_id: Option<i64>,
) -> geojson::JsonObject {
    let mut properties = geojson::JsonObject::new();
    properties.insert(NAME_PROPERTY.to_string(), name.into());
    properties.insert(column.as_str().to_string(), value.into());
    properties.insert(
        TAGS_PROPERTY.to_string(),
        tags.map(truncate_tags).into(),
    );
    properties.insert(OSM_ID_PROPERTY.to_string(), osm_id.into());
    properties
}

/// Wraps features into a feature collection document.
#[must_use]
pub fn collection(features: Vec<geojson::Feature>) -> geojson::FeatureCollection {
    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> QueryDescriptor {
        QueryDescriptor {
            kind: GeometryKind::Point,
            bounding_polygon: geo::Polygon::new(
                geo::LineString::from(vec![
                    (-140.0, 10.0),
                    (-52.0, 10.0),
                    (-52.0, 58.0),
                    (-140.0, 58.0),
                    (-140.0, 10.0),
                ]),
                vec![],
            ),
            name_not_null: true,
            column_not_null: true,
            column: AttributeName::new("access").unwrap(),
            column_filter_values: Some(vec!["private".to_string(), "o'brien".to_string()]),
            limit: 100,
        }
    }

    #[test]
    fn wkt_is_closed_ring() {
        assert_eq!(
            descriptor().bounding_polygon_wkt(),
            "POLYGON((-140 10, -52 10, -52 58, -140 58, -140 10))"
        );
    }

    #[test]
    fn display_renders_filters_and_escapes_quotes() {
        let sql = descriptor().to_string();
        assert!(sql.contains("FROM PLANET_OSM_POINT"));
        assert!(sql.contains("NAME IS NOT NULL"));
        assert!(sql.contains("ACCESS IS NOT NULL"));
        assert!(sql.contains("ACCESS IN ('private','o''brien')"));
        assert!(sql.ends_with("LIMIT 100"));
    }

    #[test]
    fn empty_filter_list_is_no_filter() {
        let mut d = descriptor();
        d.column_filter_values = Some(Vec::new());
        assert!(d.filter_values().is_none());
        assert!(!d.to_string().contains(" IN ("));
    }

    #[test]
    fn properties_truncate_tags() {
        let column = AttributeName::new("access").unwrap();
        let long = "x".repeat(MAX_TAGS_LENGTH + 10);
        let props = feature_properties(&column, Some("Gate"), Some("private"), Some(&long), Some(7));

        assert_eq!(props["NAME"], "Gate");
        assert_eq!(props["ACCESS"], "private");
        assert_eq!(props["TAGS"].as_str().unwrap().len(), MAX_TAGS_LENGTH);
        assert_eq!(props["OSM_ID"], 7);
    }
}
