#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the OSM explorer server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the session and store types so the API contract can evolve
//! independently.

use osm_explorer_geometry_models::{AttributeName, Filters, GeometryKind, LatLng, ViewportState};
use osm_explorer_query::QueryReport;
use osm_explorer_session::{
    Event, Phase, RecordingPanel, RecordingWidget, SessionState, TickOutcome, WidgetCall,
};
use osm_explorer_store::AttributeValueCount;
use osm_explorer_style::PopupField;
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Columns offered for one table.
#[derive(Debug, Clone, Serialize)]
pub struct ApiTableColumns {
    /// Geometry table.
    pub table: GeometryKind,
    /// Selectable attribute columns, in selector order.
    pub columns: Vec<AttributeName>,
}

/// Everything the control panel can offer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOptions {
    /// Tables and their columns.
    pub tables: Vec<ApiTableColumns>,
    /// Row cap choices.
    pub row_caps: Vec<u32>,
    /// Landmark selector entries, "no selection" first.
    pub landmarks: Vec<String>,
    /// Selections a new session starts with.
    pub default_filters: Filters,
    /// View a new session starts with.
    pub default_view: ViewportState,
}

/// Query parameters for the attribute values endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeValuesParams {
    /// Minimum occurrences; defaults to the configured tag threshold.
    pub min_count: Option<u64>,
}

/// A tag choice with its frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiAttributeValue {
    /// Attribute value.
    pub value: String,
    /// Number of rows carrying it.
    pub count: u64,
}

impl From<AttributeValueCount> for ApiAttributeValue {
    fn from(row: AttributeValueCount) -> Self {
        Self {
            value: row.value,
            count: row.count,
        }
    }
}

/// Public view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct ApiSession {
    /// Session id.
    pub id: String,
    /// Current phase.
    pub phase: Phase,
    /// Current selections.
    pub filters: Filters,
    /// Effective viewport.
    pub viewport: ViewportState,
    /// Selected landmark.
    pub landmark: Option<String>,
    /// Error of the last failed query, if it has not been superseded.
    pub error: Option<String>,
}

impl ApiSession {
    /// Snapshot of `state` under session id `id`.
    #[must_use]
    pub fn from_state(id: impl Into<String>, state: &SessionState) -> Self {
        Self {
            id: id.into(),
            phase: state.phase(),
            filters: state.filters().clone(),
            viewport: *state.viewport(),
            landmark: state.landmark().map(ToString::to_string),
            error: state.last_error().map(ToString::to_string),
        }
    }
}

/// Body of a tick request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TickRequest {
    /// Events since the last tick, in order.
    #[serde(default)]
    pub events: Vec<Event>,
}

/// A map view change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ApiView {
    /// New center.
    pub center: LatLng,
    /// New zoom.
    pub zoom: u8,
}

/// What the control panel is told about one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiQueryReport {
    /// Physical table name.
    pub table: String,
    /// Rows returned.
    pub rows: usize,
    /// Store round trip in milliseconds.
    pub response_time_ms: f64,
    /// Whether the result came from the cache.
    pub cached: bool,
    /// Generated query text.
    pub query: String,
}

impl From<&QueryReport> for ApiQueryReport {
    fn from(report: &QueryReport) -> Self {
        Self {
            table: report.table_name.to_string(),
            rows: report.rows,
            response_time_ms: report.response_time.as_secs_f64() * 1000.0,
            cached: report.cached,
            query: report.query.clone(),
        }
    }
}

/// A styled overlay.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOverlay {
    /// Styled `GeoJSON`; every feature carries `color` and `style`.
    pub collection: geojson::FeatureCollection,
    /// Popup fields.
    pub popup_fields: Vec<PopupField>,
}

/// Result of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct ApiTickResponse {
    /// Session after the tick.
    pub session: ApiSession,
    /// View the map must move to.
    pub view: Option<ApiView>,
    /// Overlay to draw.
    pub overlay: Option<ApiOverlay>,
    /// Whether the result was empty, so nothing was rendered and the
    /// overlay must be removed.
    pub cleared: bool,
    /// Query reports.
    pub reports: Vec<ApiQueryReport>,
    /// Query errors.
    pub errors: Vec<String>,
    /// Selection changes that were refused.
    pub rejected: Vec<String>,
    /// Phases entered.
    pub trace: Vec<Phase>,
}

impl ApiTickResponse {
    /// Collects what a tick pushed to a recording widget and panel.
    #[must_use]
    pub fn new(
        session: ApiSession,
        outcome: &TickOutcome,
        widget: &RecordingWidget,
        panel: &RecordingPanel,
    ) -> Self {
        Self {
            session,
            view: widget.view.map(|(center, zoom)| ApiView { center, zoom }),
            overlay: widget.overlay.as_ref().map(|overlay| ApiOverlay {
                collection: overlay.collection().to_geojson(),
                popup_fields: overlay.popup_fields().to_vec(),
            }),
            cleared: widget.overlay.is_none()
                && widget
                    .calls
                    .iter()
                    .any(|call| matches!(call, WidgetCall::ClearOverlay)),
            reports: panel.reports.iter().map(ApiQueryReport::from).collect(),
            errors: panel.errors.iter().map(ToString::to_string).collect(),
            rejected: panel.rejected.iter().map(ToString::to_string).collect(),
            trace: outcome.trace.clone(),
        }
    }
}

/// Query parameters for the one-shot query endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreQueryParams {
    /// Geometry table.
    pub table: GeometryKind,
    /// Attribute column.
    pub column: String,
    /// Comma-separated tag values.
    pub tags: Option<String>,
    /// Row cap; defaults to the configured default.
    pub row_cap: Option<u32>,
    /// Bounding box as `west,south,east,north`.
    pub bbox: String,
}

/// Result of a one-shot query.
#[derive(Debug, Clone, Serialize)]
pub struct ApiExploreResponse {
    /// Query report.
    pub report: ApiQueryReport,
    /// Styled overlay.
    pub overlay: ApiOverlay,
}
