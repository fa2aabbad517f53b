//! In-memory geometry store.
//!
//! Each table is a list of OSM records in load order plus an R-tree over
//! their envelopes. A query first narrows candidates to records whose
//! envelope lies inside the bounding polygon's envelope, then checks exact
//! containment with `geo`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use geo::{BoundingRect, Contains};
use geojson::GeoJson;
use osm_explorer_geometry_models::{
    AttributeName, GeometryKind, LatLng, NAME_PROPERTY, OSM_ID_PROPERTY, TAGS_PROPERTY,
};
use rstar::{AABB, RTree, RTreeObject};

use crate::{
    AttributeValueCount, CAPITAL_COLUMN, GeometryStore, LandmarkRecord, QueryDescriptor,
    STATE_CAPITAL, StoreError, collection, feature_properties,
};

/// One row of an OSM table.
#[derive(Debug, Clone)]
pub struct OsmRecord {
    /// OSM object ID.
    pub osm_id: Option<i64>,
    /// `name` tag.
    pub name: Option<String>,
    /// Raw tag string.
    pub tags: Option<String>,
    /// Attribute columns keyed by uppercase column name.
    pub attributes: BTreeMap<String, String>,
    geometry: geo::Geometry<f64>,
    geojson: geojson::Geometry,
}

impl OsmRecord {
    /// Builds a record from a `GeoJSON` feature.
    ///
    /// Property keys are matched case-insensitively. `NAME`, `OSM_ID` and
    /// `TAGS` are lifted out; every other scalar property becomes an
    /// attribute column. A `TAGS` object is kept as its JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the feature has no geometry or its geometry
    /// cannot be converted.
    pub fn from_feature(feature: &geojson::Feature) -> Result<Self, StoreError> {
        let Some(geojson) = feature.geometry.clone() else {
            return Err(StoreError::new("feature has no geometry"));
        };
        let geometry = geo::Geometry::<f64>::try_from(geojson.value.clone())?;

        let mut record = Self {
            osm_id: None,
            name: None,
            tags: None,
            attributes: BTreeMap::new(),
            geometry,
            geojson,
        };

        for (key, value) in feature.properties.iter().flatten() {
            let key = key.to_ascii_uppercase();
            match key.as_str() {
                NAME_PROPERTY => record.name = value.as_str().map(ToString::to_string),
                OSM_ID_PROPERTY => {
                    record.osm_id = value
                        .as_i64()
                        .or_else(|| value.as_str().and_then(|s| s.parse().ok()));
                }
                TAGS_PROPERTY => {
                    record.tags = match value {
                        serde_json::Value::Null => None,
                        serde_json::Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    };
                }
                _ => {
                    let text = match value {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Number(n) => n.to_string(),
                        serde_json::Value::Bool(b) => b.to_string(),
                        _ => continue,
                    };
                    record.attributes.insert(key, text);
                }
            }
        }

        Ok(record)
    }

    /// The record geometry.
    #[must_use]
    pub const fn geometry(&self) -> &geo::Geometry<f64> {
        &self.geometry
    }

    fn attribute(&self, column: &str) -> Option<&str> {
        self.attributes.get(column).map(String::as_str)
    }
}

/// A record's envelope in the R-tree, pointing back at its load position.
struct IndexedRecord {
    position: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRecord {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

#[derive(Default)]
struct MemoryTable {
    records: Vec<OsmRecord>,
    index: RTree<IndexedRecord>,
}

impl MemoryTable {
    fn rebuild_index(&mut self) {
        let entries: Vec<IndexedRecord> = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(position, record)| {
                let rect = record.geometry.bounding_rect()?;
                Some(IndexedRecord {
                    position,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();
        self.index = RTree::bulk_load(entries);
    }
}

/// Geometry store backed by in-memory R-trees.
///
/// Query results are returned in load order.
#[derive(Default)]
pub struct MemoryStore {
    tables: BTreeMap<GeometryKind, MemoryTable>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from records, keeping their order per table.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = (GeometryKind, OsmRecord)>) -> Self {
        let mut store = Self::new();
        for (kind, record) in records {
            store.tables.entry(kind).or_default().records.push(record);
        }
        for table in store.tables.values_mut() {
            table.rebuild_index();
        }
        store
    }

    /// Appends the features of a `GeoJSON` document to a table.
    ///
    /// Features that cannot be converted are logged and skipped. Returns the
    /// number of records added.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if `text` is not `GeoJSON`.
    pub fn load_geojson(&mut self, kind: GeometryKind, text: &str) -> Result<usize, StoreError> {
        let features = match text.parse::<GeoJson>()? {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(feature) => vec![feature],
            GeoJson::Geometry(_) => {
                return Err(StoreError::new(
                    "expected a Feature or FeatureCollection, got a bare geometry",
                ));
            }
        };

        let table = self.tables.entry(kind).or_default();
        let before = table.records.len();
        for (i, feature) in features.iter().enumerate() {
            match OsmRecord::from_feature(feature) {
                Ok(record) => table.records.push(record),
                Err(e) => log::warn!("Skipping {kind} feature {i}: {e}"),
            }
        }
        table.rebuild_index();

        Ok(table.records.len() - before)
    }

    /// Loads `planet_osm_{point,line,polygon}.geojson` from a directory.
    ///
    /// Missing files leave their table empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if a present file cannot be read or parsed.
    pub fn load_dir(dir: &Path) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for &kind in GeometryKind::all() {
            let path = dir.join(format!("planet_osm_{}.geojson", kind.table_suffix()));
            if !path.exists() {
                log::warn!("No {kind} data at {}", path.display());
                continue;
            }
            let text = std::fs::read_to_string(&path)?;
            let count = store.load_geojson(kind, &text)?;
            log::info!("Loaded {count} {kind} record(s) from {}", path.display());
        }
        Ok(store)
    }

    /// Number of records in a table.
    #[must_use]
    pub fn len(&self, kind: GeometryKind) -> usize {
        self.tables.get(&kind).map_or(0, |t| t.records.len())
    }

    /// Whether every table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|t| t.records.is_empty())
    }
}

impl GeometryStore for MemoryStore {
    fn feature_collection(
        &self,
        query: &QueryDescriptor,
    ) -> Result<geojson::FeatureCollection, StoreError> {
        let Some(table) = self.tables.get(&query.kind) else {
            return Ok(collection(Vec::new()));
        };
        let Some(bounds) = query.bounding_polygon.bounding_rect() else {
            return Err(StoreError::new("bounding polygon is empty"));
        };
        let envelope = AABB::from_corners(
            [bounds.min().x, bounds.min().y],
            [bounds.max().x, bounds.max().y],
        );

        let mut positions: Vec<usize> = table
            .index
            .locate_in_envelope(&envelope)
            .map(|entry| entry.position)
            .collect();
        positions.sort_unstable();

        let filter: Option<BTreeSet<&str>> = query
            .filter_values()
            .map(|values| values.iter().map(String::as_str).collect());
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let column = query.column.as_str();

        let mut features = Vec::new();
        for position in positions {
            if features.len() >= limit {
                break;
            }
            let record = &table.records[position];
            let value = record.attribute(column);

            if query.name_not_null && record.name.is_none() {
                continue;
            }
            if query.column_not_null && value.is_none() {
                continue;
            }
            if let Some(filter) = &filter
                && !value.is_some_and(|v| filter.contains(v))
            {
                continue;
            }
            if !query.bounding_polygon.contains(&record.geometry) {
                continue;
            }

            features.push(geojson::Feature {
                bbox: None,
                geometry: Some(record.geojson.clone()),
                id: None,
                properties: Some(feature_properties(
                    &query.column,
                    record.name.as_deref(),
                    value,
                    record.tags.as_deref(),
                    record.osm_id,
                )),
                foreign_members: None,
            });
        }

        Ok(collection(features))
    }

    fn attribute_values(
        &self,
        kind: GeometryKind,
        column: &AttributeName,
        min_count: u64,
    ) -> Result<Vec<AttributeValueCount>, StoreError> {
        let Some(table) = self.tables.get(&kind) else {
            return Ok(Vec::new());
        };

        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for value in table
            .records
            .iter()
            .filter_map(|record| record.attribute(column.as_str()))
        {
            *counts.entry(value).or_default() += 1;
        }

        let mut values: Vec<AttributeValueCount> = counts
            .into_iter()
            .filter(|&(_, count)| count >= min_count)
            .map(|(value, count)| AttributeValueCount {
                value: value.to_string(),
                count,
            })
            .collect();
        // Stable sort keeps equal counts in value order.
        values.sort_by(|a, b| b.count.cmp(&a.count));

        Ok(values)
    }

    fn landmarks(&self) -> Result<Vec<LandmarkRecord>, StoreError> {
        let Some(table) = self.tables.get(&GeometryKind::Point) else {
            return Ok(Vec::new());
        };

        let mut landmarks: Vec<LandmarkRecord> = table
            .records
            .iter()
            .filter(|record| record.attribute(CAPITAL_COLUMN) == Some(STATE_CAPITAL))
            .filter_map(|record| {
                let name = record.name.clone()?;
                let geo::Geometry::Point(point) = &record.geometry else {
                    return None;
                };
                Some(LandmarkRecord {
                    name,
                    location: LatLng::new(point.y(), point.x()),
                })
            })
            .collect();
        landmarks.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(landmarks)
    }
}
