#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial query builder and query result cache.
//!
//! [`build_and_execute`] turns a [`QueryParameters`] tuple into a single
//! store round trip; [`QueryCache`] memoizes the resulting documents.

pub mod cache;

use std::time::{Duration, Instant};

use osm_explorer_geometry_models::{GeometryKind, QueryParameters};
use osm_explorer_store::{GeometryStore, QueryDescriptor, StoreError};

pub use cache::{CacheEntry, DEFAULT_CAPACITY, QueryCache};

/// A store round trip failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Query on {} failed: {source}", .table.table_name())]
pub struct QueryExecutionError {
    /// Table that was queried.
    pub table: GeometryKind,
    /// Underlying store failure.
    #[source]
    pub source: StoreError,
}

/// What the control panel is told about a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReport {
    /// Physical table name, e.g. `PLANET_OSM_POINT`.
    pub table_name: &'static str,
    /// Rows returned.
    pub rows: usize,
    /// Store round-trip time (zero for cache hits).
    pub response_time: Duration,
    /// Whether the result came from the cache.
    pub cached: bool,
    /// Generated query text.
    pub query: String,
}

impl QueryReport {
    /// Report for a result served from the cache.
    #[must_use]
    pub fn from_cache(params: &QueryParameters, rows: usize) -> Self {
        Self {
            table_name: params.table.table_name(),
            rows,
            response_time: Duration::ZERO,
            cached: true,
            query: describe(params).to_string(),
        }
    }
}

/// A store result together with its report.
#[derive(Debug, Clone)]
pub struct ExecutedQuery {
    /// The store document.
    pub collection: geojson::FeatureCollection,
    /// Table, row count, timing and query text.
    pub report: QueryReport,
}

/// Builds the store descriptor for `params`.
///
/// The bounding polygon is the closed five-point ring of the rectangle's
/// corners. Name and column are always required to be non-null.
#[must_use]
pub fn describe(params: &QueryParameters) -> QueryDescriptor {
    let ring = geo::LineString::from(params.rectangle.ring().to_vec());

    QueryDescriptor {
        kind: params.table,
        bounding_polygon: geo::Polygon::new(ring, vec![]),
        name_not_null: true,
        column_not_null: true,
        column: params.column.clone(),
        column_filter_values: params
            .tags
            .as_ref()
            .filter(|tags| !tags.is_empty())
            .map(|tags| tags.iter().cloned().collect()),
        limit: params.row_cap,
    }
}

/// Runs one spatial query against `store`.
///
/// An empty store result yields an empty collection, not an error.
///
/// # Errors
///
/// Returns [`QueryExecutionError`] if the store fails.
pub fn build_and_execute(
    store: &dyn GeometryStore,
    params: &QueryParameters,
) -> Result<ExecutedQuery, QueryExecutionError> {
    let descriptor = describe(params);
    log::debug!("Generated query:\n{descriptor}");

    let start = Instant::now();
    let collection = store.feature_collection(&descriptor).map_err(|source| {
        log::error!("Query on {} failed: {source}", params.table.table_name());
        QueryExecutionError {
            table: params.table,
            source,
        }
    })?;
    let response_time = start.elapsed();

    let rows = collection.features.len();
    log::info!(
        "Queried {}: {rows} row(s) in {:.3}s",
        params.table.table_name(),
        response_time.as_secs_f64()
    );

    Ok(ExecutedQuery {
        collection,
        report: QueryReport {
            table_name: params.table.table_name(),
            rows,
            response_time,
            cached: false,
            query: descriptor.to_string(),
        },
    })
}
