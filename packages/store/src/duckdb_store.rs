//! `DuckDB` geometry store.
//!
//! Expects one table per geometry kind, named `planet_osm_point`,
//! `planet_osm_line` and `planet_osm_polygon`, with at least these columns:
//!
//! | column        | type      |
//! |---------------|-----------|
//! | `osm_id`      | `BIGINT`  |
//! | `name`        | `VARCHAR` |
//! | `tags`        | `VARCHAR` |
//! | `way_geojson` | `VARCHAR` |
//! | `min_x`, `min_y`, `max_x`, `max_y` | `DOUBLE` |
//!
//! plus one column per attribute (`access`, `amenity`, `capital`, ...).
//! The envelope columns let each query run as a single indexed range scan.

use std::path::Path;
use std::sync::Mutex;

use duckdb::Connection;
use geo::BoundingRect;
use osm_explorer_geometry_models::{AttributeName, GeometryKind, LatLng};

use crate::{
    AttributeValueCount, CAPITAL_COLUMN, GeometryStore, LandmarkRecord, QueryDescriptor,
    STATE_CAPITAL, StoreError, collection, feature_properties,
};

/// Geometry store reading a `DuckDB` warehouse.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl DuckDbStore {
    /// Opens the `DuckDB` file at `path` read-only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?,
        )?;
        log::info!("Opened DuckDB geometry store at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Wraps an already open connection.
    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::new("DuckDB connection lock poisoned"))?;
        f(&conn)
    }
}

fn table(kind: GeometryKind) -> String {
    format!("planet_osm_{}", kind.table_suffix())
}

/// Quotes a validated attribute name as a SQL identifier.
fn quoted(column: &AttributeName) -> String {
    format!("\"{}\"", column.as_str())
}

impl GeometryStore for DuckDbStore {
    fn feature_collection(
        &self,
        query: &QueryDescriptor,
    ) -> Result<geojson::FeatureCollection, StoreError> {
        let Some(bounds) = query.bounding_polygon.bounding_rect() else {
            return Err(StoreError::new("bounding polygon is empty"));
        };

        let column = quoted(&query.column);
        let mut sql = format!(
            "SELECT name, CAST({column} AS VARCHAR), tags, osm_id, way_geojson \
             FROM {} \
             WHERE min_x >= ? AND min_y >= ? AND max_x <= ? AND max_y <= ?",
            table(query.kind),
        );
        if query.name_not_null {
            sql.push_str(" AND name IS NOT NULL");
        }
        if query.column_not_null {
            sql.push_str(&format!(" AND {column} IS NOT NULL"));
        }
        let filter = query.filter_values().unwrap_or_default();
        if !filter.is_empty() {
            let placeholders: String = filter.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            sql.push_str(&format!(" AND CAST({column} AS VARCHAR) IN ({placeholders})"));
        }
        sql.push_str(&format!(" LIMIT {}", query.limit));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.raw_bind_parameter(1, bounds.min().x)?;
            stmt.raw_bind_parameter(2, bounds.min().y)?;
            stmt.raw_bind_parameter(3, bounds.max().x)?;
            stmt.raw_bind_parameter(4, bounds.max().y)?;
            for (i, value) in filter.iter().enumerate() {
                stmt.raw_bind_parameter(i + 5, value)?;
            }

            stmt.raw_execute()?;
            let mut rows = stmt.raw_query();
            let mut features = Vec::new();
            while let Some(row) = rows.next()? {
                let name: Option<String> = row.get(0)?;
                let value: Option<String> = row.get(1)?;
                let tags: Option<String> = row.get(2)?;
                let osm_id: Option<i64> = row.get(3)?;
                let way: String = row.get(4)?;

                let geometry = match way.parse::<geojson::Geometry>() {
                    Ok(geometry) => geometry,
                    Err(e) => {
                        log::warn!("Skipping OSM object {osm_id:?} with unreadable geometry: {e}");
                        continue;
                    }
                };

                features.push(geojson::Feature {
                    bbox: None,
                    geometry: Some(geometry),
                    id: None,
                    properties: Some(feature_properties(
                        &query.column,
                        name.as_deref(),
                        value.as_deref(),
                        tags.as_deref(),
                        osm_id,
                    )),
                    foreign_members: None,
                });
            }

            Ok(collection(features))
        })
    }

    fn attribute_values(
        &self,
        kind: GeometryKind,
        column: &AttributeName,
        min_count: u64,
    ) -> Result<Vec<AttributeValueCount>, StoreError> {
        let column = quoted(column);
        let sql = format!(
            "SELECT CAST({column} AS VARCHAR) AS value, COUNT(*) AS inst \
             FROM {} \
             WHERE {column} IS NOT NULL \
             GROUP BY 1 HAVING COUNT(*) >= ? \
             ORDER BY inst DESC, value",
            table(kind),
        );
        let min_count = i64::try_from(min_count).unwrap_or(i64::MAX);

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.raw_bind_parameter(1, min_count)?;

            stmt.raw_execute()?;
            let mut rows = stmt.raw_query();
            let mut values = Vec::new();
            while let Some(row) = rows.next()? {
                let value: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                values.push(AttributeValueCount {
                    value,
                    count: u64::try_from(count).unwrap_or_default(),
                });
            }
            Ok(values)
        })
    }

    fn landmarks(&self) -> Result<Vec<LandmarkRecord>, StoreError> {
        let sql = format!(
            "SELECT name, (min_x + max_x) / 2, (min_y + max_y) / 2 \
             FROM {} \
             WHERE CAST({CAPITAL_COLUMN} AS VARCHAR) = ? AND name IS NOT NULL \
             ORDER BY name",
            table(GeometryKind::Point),
        );

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.raw_bind_parameter(1, STATE_CAPITAL)?;

            stmt.raw_execute()?;
            let mut rows = stmt.raw_query();
            let mut landmarks = Vec::new();
            while let Some(row) = rows.next()? {
                let name: String = row.get(0)?;
                let lng: f64 = row.get(1)?;
                let lat: f64 = row.get(2)?;
                landmarks.push(LandmarkRecord {
                    name,
                    location: LatLng::new(lat, lng),
                });
            }
            Ok(landmarks)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DuckDbStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE planet_osm_point (
                osm_id BIGINT, name VARCHAR, tags VARCHAR, access VARCHAR, capital VARCHAR,
                way_geojson VARCHAR, min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE
            );
            INSERT INTO planet_osm_point VALUES
                (1, 'Statehouse', 'a', 'private', '4',
                 '{\"type\":\"Point\",\"coordinates\":[-86.15,39.76]}', -86.15, 39.76, -86.15, 39.76),
                (2, 'Gate', NULL, 'permissive', NULL,
                 '{\"type\":\"Point\",\"coordinates\":[-86.10,39.80]}', -86.10, 39.80, -86.10, 39.80),
                (3, NULL, NULL, 'private', NULL,
                 '{\"type\":\"Point\",\"coordinates\":[-86.12,39.78]}', -86.12, 39.78, -86.12, 39.78),
                (4, 'Atlanta', NULL, 'private', '4',
                 '{\"type\":\"Point\",\"coordinates\":[-84.39,33.75]}', -84.39, 33.75, -84.39, 33.75);",
        )
        .unwrap();
        DuckDbStore::from_connection(conn)
    }

    fn descriptor() -> QueryDescriptor {
        QueryDescriptor {
            kind: GeometryKind::Point,
            bounding_polygon: geo::Polygon::new(
                geo::LineString::from(vec![
                    (-87.0, 39.0),
                    (-86.0, 39.0),
                    (-86.0, 40.0),
                    (-87.0, 40.0),
                    (-87.0, 39.0),
                ]),
                vec![],
            ),
            name_not_null: true,
            column_not_null: true,
            column: AttributeName::new("access").unwrap(),
            column_filter_values: None,
            limit: 1000,
        }
    }

    #[test]
    fn query_filters_by_envelope_and_nulls() {
        let fc = store().feature_collection(&descriptor()).unwrap();
        let mut ids: Vec<i64> = fc
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()["OSM_ID"].as_i64().unwrap())
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, [1, 2]);
        assert_eq!(fc.features[0].properties.as_ref().unwrap()["ACCESS"], "private");
    }

    #[test]
    fn query_binds_filter_values() {
        let mut d = descriptor();
        d.column_filter_values = Some(vec!["permissive".to_string()]);
        let fc = store().feature_collection(&d).unwrap();
        assert_eq!(fc.features.len(), 1);
        assert_eq!(fc.features[0].properties.as_ref().unwrap()["NAME"], "Gate");
    }

    #[test]
    fn attribute_values_ordered_by_frequency() {
        let values = store()
            .attribute_values(GeometryKind::Point, &AttributeName::new("access").unwrap(), 1)
            .unwrap();
        assert_eq!(values[0].value, "private");
        assert_eq!(values[0].count, 3);
        assert_eq!(values[1].value, "permissive");
    }

    #[test]
    fn landmarks_are_capitals() {
        let landmarks = store().landmarks().unwrap();
        let names: Vec<&str> = landmarks.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Atlanta", "Statehouse"]);
    }
}
