//! The view state machine.
//!
//! Two sources can claim the current viewport: the map widget's last valid
//! report and a landmark override. Each accepted claim is stamped with a
//! sequence number and the most recent claim wins. Overrides requested in a
//! tick are stamped after every other event of that tick, so a fresh
//! landmark jump always wins its own tick. With no claim at all the default
//! view is used.

use std::sync::Arc;

use osm_explorer_geometry_models::{Filters, LatLng, QueryKey, QueryParameters, ViewportState};
use osm_explorer_normalize::{
    DEFAULT_CENTER, DEFAULT_ZOOM, MalformedBoundsError, default_rectangle, parse_bounds,
};
use osm_explorer_query::QueryExecutionError;
use osm_explorer_style::FeatureCollection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display};

use crate::{Environment, SelectionError};

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
pub enum Phase {
    /// No tick has run yet.
    Uninitialized,
    /// A viewport is known but no result for it is held.
    HasViewport,
    /// A query for the effective key is in flight.
    QueryPending,
    /// The held result matches the effective key.
    QuerySatisfied,
    /// A landmark jump is being applied.
    Overridden,
}

/// A map widget's state report. Unusable parts are dropped when parsing,
/// never rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct ViewportReport {
    /// Raw `{"_southWest": ..., "_northEast": ...}` bounds.
    pub bounds: Option<Value>,
    /// Reported zoom.
    pub zoom: Option<u8>,
    /// Reported center.
    pub center: Option<LatLng>,
}

impl From<Value> for ViewportReport {
    fn from(value: Value) -> Self {
        Self {
            bounds: value.get("bounds").filter(|b| !b.is_null()).cloned(),
            zoom: value
                .get("zoom")
                .and_then(Value::as_u64)
                .and_then(|z| u8::try_from(z).ok()),
            center: value.get("center").and_then(|c| {
                Some(LatLng::new(
                    c.get("lat")?.as_f64()?,
                    c.get("lng")?.as_f64()?,
                ))
            }),
        }
    }
}

/// One user interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Event {
    /// The map widget reported its state.
    ViewportChanged(ViewportReport),
    /// The control panel selections changed.
    FiltersChanged(Filters),
    /// A landmark (or "no selection") was picked.
    LandmarkSelected(Option<String>),
    /// Re-run the pipeline with unchanged inputs.
    Rerun,
}

/// Work the driver must carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Move the map.
    SetView {
        /// New center.
        center: LatLng,
        /// New zoom.
        zoom: u8,
    },
    /// Fetch results for these parameters (from cache or store).
    Query(QueryParameters),
    /// Draw this non-empty overlay.
    Render(Arc<FeatureCollection>),
    /// Remove the overlay; the result had no features.
    ClearOverlay,
    /// Tell the control panel a query failed.
    ReportError(QueryExecutionError),
    /// Tell the control panel a selection was refused; the previous
    /// selections stay in effect.
    RejectSelection(SelectionError),
}

/// A new state plus the effects to carry out.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The state after the step.
    pub state: SessionState,
    /// Effects, in order.
    pub effects: Vec<Effect>,
    /// Phases entered during the step, in order.
    pub trace: Vec<Phase>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Claim {
    viewport: ViewportState,
    seq: u64,
}

#[derive(Debug, Clone)]
struct Held {
    params: QueryParameters,
    key: QueryKey,
    document: Arc<geojson::FeatureCollection>,
    styled: Arc<FeatureCollection>,
}

impl Held {
    fn display_effect(&self) -> Effect {
        if self.styled.is_empty() {
            Effect::ClearOverlay
        } else {
            Effect::Render(Arc::clone(&self.styled))
        }
    }
}

/// Everything one session remembers between ticks.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: Phase,
    filters: Filters,
    viewport: ViewportState,
    widget: Option<Claim>,
    landmark_override: Option<Claim>,
    landmark: Option<String>,
    sequence: u64,
    held: Option<Held>,
    pending: Option<QueryParameters>,
    last_error: Option<QueryExecutionError>,
}

impl Default for SessionState {
    /// An uninitialized session over the built-in defaults. Ticks should
    /// start from [`SessionState::new`], which honors the configuration.
    fn default() -> Self {
        Self {
            phase: Phase::Uninitialized,
            filters: Filters::default(),
            viewport: ViewportState {
                rectangle: default_rectangle(),
                zoom: DEFAULT_ZOOM,
                center: DEFAULT_CENTER,
            },
            widget: None,
            landmark_override: None,
            landmark: None,
            sequence: 0,
            held: None,
            pending: None,
            last_error: None,
        }
    }
}

impl SessionState {
    /// A fresh session with the default view and default selections.
    #[must_use]
    pub fn new(env: &Environment) -> Self {
        Self {
            phase: Phase::Uninitialized,
            filters: env.options.default_filters(),
            viewport: env.default_view,
            widget: None,
            landmark_override: None,
            landmark: None,
            sequence: 0,
            held: None,
            pending: None,
            last_error: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Current control panel selections.
    #[must_use]
    pub const fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Effective viewport as of the last tick.
    #[must_use]
    pub const fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    /// Selected landmark, if any.
    #[must_use]
    pub fn landmark(&self) -> Option<&str> {
        self.landmark.as_deref()
    }

    /// Parameters of the query in flight.
    #[must_use]
    pub const fn pending(&self) -> Option<&QueryParameters> {
        self.pending.as_ref()
    }

    /// Error of the most recent failed query, cleared by the next success.
    #[must_use]
    pub const fn last_error(&self) -> Option<&QueryExecutionError> {
        self.last_error.as_ref()
    }

    /// Parameters of the held result.
    #[must_use]
    pub fn held_parameters(&self) -> Option<&QueryParameters> {
        self.held.as_ref().map(|held| &held.params)
    }

    /// The held raw store document.
    #[must_use]
    pub fn document(&self) -> Option<&Arc<geojson::FeatureCollection>> {
        self.held.as_ref().map(|held| &held.document)
    }

    /// The held styled overlay.
    #[must_use]
    pub fn overlay(&self) -> Option<&Arc<FeatureCollection>> {
        self.held.as_ref().map(|held| &held.styled)
    }

    /// Folds one batch of events into the state.
    ///
    /// Emits at most one [`Effect::Query`], and only when the effective
    /// query key differs from the held result's key.
    #[must_use]
    pub fn tick(mut self, events: &[Event], env: &Environment) -> Transition {
        let mut trace = Vec::new();
        let mut effects = Vec::new();
        let mut fresh_override = None;
        let mut rerun = false;

        for event in events {
            match event {
                Event::ViewportChanged(report) => match self.read_report(report, env) {
                    Ok(viewport) => {
                        self.sequence += 1;
                        self.widget = Some(Claim {
                            viewport,
                            seq: self.sequence,
                        });
                    }
                    Err(e) => log::warn!("Ignoring malformed viewport report: {e}"),
                },
                Event::FiltersChanged(filters) => {
                    let next = env.options.reconcile(&self.filters, filters.clone());
                    match env.options.validate(&next) {
                        Ok(()) => self.filters = next,
                        Err(e) => {
                            log::warn!("Keeping previous selections: {e}");
                            effects.push(Effect::RejectSelection(e));
                        }
                    }
                }
                Event::LandmarkSelected(name) => match env.locator.resolve(name.as_deref()) {
                    Ok(None) => {
                        self.landmark = None;
                        self.landmark_override = None;
                        fresh_override = None;
                    }
                    Ok(Some(location)) => match env.landmark_viewport(location) {
                        Ok(viewport) => {
                            self.landmark.clone_from(name);
                            fresh_override = Some(viewport);
                        }
                        Err(e) => log::warn!("Ignoring landmark with unusable location: {e}"),
                    },
                    Err(e) => log::warn!("Ignoring landmark selection: {e}"),
                },
                Event::Rerun => rerun = true,
            }
        }

        if let Some(viewport) = fresh_override {
            self.sequence += 1;
            self.landmark_override = Some(Claim {
                viewport,
                seq: self.sequence,
            });
            self.enter(Phase::Overridden, &mut trace);
            effects.push(Effect::SetView {
                center: viewport.center,
                zoom: viewport.zoom,
            });
        }

        self.viewport = self.effective_viewport(env);
        if matches!(self.phase, Phase::Uninitialized | Phase::Overridden) {
            self.enter(Phase::HasViewport, &mut trace);
        }

        let params = QueryParameters::new(&self.filters, self.viewport.rectangle);
        let key = params.key();

        match &self.held {
            Some(held) if held.key == key => {
                if rerun {
                    effects.push(held.display_effect());
                }
                self.pending = None;
                self.enter(Phase::QuerySatisfied, &mut trace);
            }
            _ => {
                if self.pending.as_ref().is_some_and(|p| p.key() == key) {
                    log::debug!("Query for the effective key is already pending");
                } else {
                    log::debug!(
                        "Effective key changed: {} {} {:?}",
                        params.table,
                        params.column,
                        params.rectangle
                    );
                    self.pending = Some(params.clone());
                    effects.push(Effect::Query(params));
                }
                self.enter(Phase::QueryPending, &mut trace);
            }
        }

        Transition {
            state: self,
            effects,
            trace,
        }
    }

    /// Feeds a query outcome back into the state.
    ///
    /// Outcomes for anything but the pending query are ignored. A success
    /// replaces the held result and renders it (or clears the overlay when
    /// it has no features); a failure keeps the held result and reports the
    /// error.
    #[must_use]
    pub fn complete(
        mut self,
        params: &QueryParameters,
        outcome: Result<Arc<geojson::FeatureCollection>, QueryExecutionError>,
        env: &Environment,
    ) -> Transition {
        let key = params.key();
        if self.pending.as_ref().is_none_or(|p| p.key() != key) {
            log::debug!("Ignoring outcome of a superseded query");
            return Transition {
                state: self,
                effects: Vec::new(),
                trace: Vec::new(),
            };
        }
        self.pending = None;

        let mut trace = Vec::new();
        let effect = match outcome {
            Ok(document) => {
                let styled = env.styler.style_document(
                    &document,
                    &params.column,
                    params.tags.as_ref(),
                );
                let held = Held {
                    params: params.clone(),
                    key,
                    document,
                    styled: Arc::new(styled),
                };
                let effect = held.display_effect();
                self.held = Some(held);
                self.last_error = None;
                self.enter(Phase::QuerySatisfied, &mut trace);
                effect
            }
            Err(error) => {
                log::warn!("Keeping previous overlay after failed query: {error}");
                self.last_error = Some(error.clone());
                self.enter(Phase::HasViewport, &mut trace);
                Effect::ReportError(error)
            }
        };

        Transition {
            state: self,
            effects: vec![effect],
            trace,
        }
    }

    fn enter(&mut self, phase: Phase, trace: &mut Vec<Phase>) {
        if self.phase != phase {
            log::debug!("Session phase {} -> {phase}", self.phase);
            self.phase = phase;
            trace.push(phase);
        }
    }

    fn read_report(
        &self,
        report: &ViewportReport,
        env: &Environment,
    ) -> Result<ViewportState, MalformedBoundsError> {
        let bounds = report
            .bounds
            .as_ref()
            .ok_or_else(|| MalformedBoundsError::MissingKey {
                path: "bounds".to_string(),
            })?;
        let raw = parse_bounds(bounds)?;

        Ok(ViewportState {
            rectangle: env.normalizer.quantize(&raw),
            zoom: report.zoom.unwrap_or(self.viewport.zoom),
            center: report.center.unwrap_or_else(|| raw.center()),
        })
    }

    fn effective_viewport(&self, env: &Environment) -> ViewportState {
        let latest = match (self.landmark_override, self.widget) {
            (Some(landmark), Some(widget)) => {
                if landmark.seq > widget.seq {
                    landmark
                } else {
                    widget
                }
            }
            (Some(claim), None) | (None, Some(claim)) => claim,
            (None, None) => return env.default_view,
        };
        latest.viewport
    }
}

#[cfg(test)]
mod tests {
    use osm_explorer_geometry_models::{AttributeName, GeometryKind, TagSet};
    use osm_explorer_landmark::Locator;
    use osm_explorer_store::{LandmarkRecord, StoreError};
    use serde_json::json;

    use super::*;

    const INDIANAPOLIS: LatLng = LatLng::new(39.768, -86.158);

    fn env() -> Environment {
        Environment::default().with_locator(Locator::new([LandmarkRecord {
            name: "Indianapolis".to_string(),
            location: INDIANAPOLIS,
        }]))
    }

    fn report(sw: (f64, f64), ne: (f64, f64)) -> Event {
        Event::ViewportChanged(ViewportReport::from(json!({
            "bounds": {
                "_southWest": {"lat": sw.0, "lng": sw.1},
                "_northEast": {"lat": ne.0, "lng": ne.1},
            },
            "zoom": 6,
        })))
    }

    fn document(values: &[&str]) -> Arc<geojson::FeatureCollection> {
        let features = values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let mut properties = geojson::JsonObject::new();
                properties.insert("NAME".to_string(), format!("feature {i}").into());
                properties.insert("ACCESS".to_string(), (*value).into());
                geojson::Feature {
                    bbox: None,
                    geometry: Some(geojson::Geometry::new(geojson::Value::Point(vec![
                        -86.0, 39.0,
                    ]))),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();
        Arc::new(geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }

    fn queries(effects: &[Effect]) -> Vec<&QueryParameters> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Query(params) => Some(params),
                _ => None,
            })
            .collect()
    }

    /// Runs a tick and answers its query (if any) with `answer`.
    fn settle(
        state: SessionState,
        events: &[Event],
        answer: &[&str],
        env: &Environment,
    ) -> (SessionState, Vec<Effect>) {
        let Transition {
            mut state,
            mut effects,
            ..
        } = state.tick(events, env);
        if let Some(params) = queries(&effects).first().map(|p| (*p).clone()) {
            let done = state.complete(&params, Ok(document(answer)), env);
            state = done.state;
            effects.extend(done.effects);
        }
        (state, effects)
    }

    #[test]
    fn placeholder_state_is_uninitialized() {
        let state = SessionState::default();
        assert_eq!(state.phase(), Phase::Uninitialized);
        assert!(state.pending().is_none());
        assert!(state.overlay().is_none());
    }

    #[test]
    fn first_tick_queries_default_view() {
        let env = env();
        let transition = SessionState::new(&env).tick(&[], &env);

        assert_eq!(transition.trace, [Phase::HasViewport, Phase::QueryPending]);
        let issued = queries(&transition.effects);
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].rectangle, env.default_view.rectangle);
        assert_eq!(issued[0].table, GeometryKind::Point);
        assert_eq!(issued[0].column.as_str(), "ACCESS");
    }

    #[test]
    fn completion_renders_and_satisfies() {
        let env = env();
        let (state, effects) = settle(SessionState::new(&env), &[], &["private"], &env);

        assert_eq!(state.phase(), Phase::QuerySatisfied);
        assert!(matches!(effects.last(), Some(Effect::Render(c)) if c.len() == 1));

        let again = state.tick(&[], &env);
        assert!(again.effects.is_empty(), "unchanged inputs must not re-query");
        assert_eq!(again.state.phase(), Phase::QuerySatisfied);
    }

    #[test]
    fn empty_result_clears_instead_of_rendering() {
        let env = env();
        let (state, effects) = settle(SessionState::new(&env), &[], &[], &env);

        assert_eq!(effects.last(), Some(&Effect::ClearOverlay));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Render(_))));
        assert!(state.overlay().unwrap().is_empty());
    }

    #[test]
    fn column_change_reuses_viewport_and_queries_once() {
        let env = env();
        let (state, _) = settle(
            SessionState::new(&env),
            &[report((39.0, -87.0), (40.0, -86.0))],
            &["private"],
            &env,
        );
        let viewport = *state.viewport();

        let filters = Filters {
            column: AttributeName::new("AMENITY").unwrap(),
            ..state.filters().clone()
        };
        let transition = state.tick(
            &[
                Event::FiltersChanged(filters.clone()),
                Event::FiltersChanged(filters),
            ],
            &env,
        );

        let issued = queries(&transition.effects);
        assert_eq!(issued.len(), 1, "identical changes in one tick query once");
        assert_eq!(issued[0].column.as_str(), "AMENITY");
        assert_eq!(issued[0].rectangle, viewport.rectangle);
        assert_eq!(transition.state.phase(), Phase::QueryPending);
    }

    #[test]
    fn unoffered_selection_is_rejected_and_previous_kept() {
        let env = env();
        let (state, _) = settle(
            SessionState::new(&env),
            &[report((39.0, -87.0), (40.0, -86.0))],
            &["private"],
            &env,
        );
        let before = state.filters().clone();

        let transition = state.tick(
            &[Event::FiltersChanged(Filters {
                column: AttributeName::new("NOT_A_COLUMN").unwrap(),
                row_cap: 4_000_000_000,
                ..before.clone()
            })],
            &env,
        );

        assert!(queries(&transition.effects).is_empty());
        assert!(transition.effects.iter().any(|e| matches!(
            e,
            Effect::RejectSelection(SelectionError::ColumnNotAllowed { .. })
        )));
        assert_eq!(transition.state.filters(), &before);
        assert_eq!(transition.state.phase(), Phase::QuerySatisfied);

        let transition = transition.state.tick(
            &[Event::FiltersChanged(Filters {
                row_cap: 7,
                ..before.clone()
            })],
            &env,
        );
        assert_eq!(
            transition.effects,
            [Effect::RejectSelection(SelectionError::RowCapNotOffered(7))]
        );
        assert_eq!(transition.state.filters(), &before);
    }

    #[test]
    fn jittered_report_does_not_requery() {
        let env = env();
        let (state, _) = settle(
            SessionState::new(&env),
            &[report((39.001, -87.001), (40.001, -86.001))],
            &["private"],
            &env,
        );
        let transition = state.tick(&[report((39.0012, -87.0012), (40.0012, -86.0012))], &env);
        assert!(queries(&transition.effects).is_empty());
    }

    #[test]
    fn landmark_overrides_until_widget_reports() {
        let env = env();
        let (state, _) = settle(
            SessionState::new(&env),
            &[report((10.0, -140.0), (58.0, -52.0))],
            &["private"],
            &env,
        );

        let transition = state.tick(
            &[Event::LandmarkSelected(Some("Indianapolis".to_string()))],
            &env,
        );
        assert!(transition.trace.contains(&Phase::Overridden));
        assert_eq!(
            transition.effects[0],
            Effect::SetView {
                center: INDIANAPOLIS,
                zoom: 11
            }
        );
        let issued = queries(&transition.effects);
        assert_eq!(issued.len(), 1);
        assert!(issued[0].rectangle.west() < INDIANAPOLIS.lng);
        assert!(issued[0].rectangle.east() > INDIANAPOLIS.lng);
        assert!(issued[0].rectangle.east() - issued[0].rectangle.west() < 1.0);

        let params = issued[0].clone();
        let state = transition.state;
        assert_eq!(state.viewport().center, INDIANAPOLIS);
        assert_eq!(state.viewport().zoom, 11);
        assert_eq!(state.landmark(), Some("Indianapolis"));

        let state = state.complete(&params, Ok(document(&["private"])), &env).state;
        let state = state.tick(&[], &env).state;
        assert_eq!(state.phase(), Phase::QuerySatisfied);
        assert_eq!(state.viewport().center, INDIANAPOLIS, "override persists");

        let state = state
            .tick(&[report((30.0, -100.0), (35.0, -90.0))], &env)
            .state;
        assert_ne!(state.viewport().center, INDIANAPOLIS, "widget report wins");
        assert_eq!(state.viewport().zoom, 6);
    }

    #[test]
    fn fresh_landmark_wins_over_same_tick_report() {
        let env = env();
        let transition = SessionState::new(&env).tick(
            &[
                Event::LandmarkSelected(Some("Indianapolis".to_string())),
                report((30.0, -100.0), (35.0, -90.0)),
            ],
            &env,
        );
        assert_eq!(transition.state.viewport().center, INDIANAPOLIS);
    }

    #[test]
    fn clearing_landmark_restores_widget_view() {
        let env = env();
        let state = SessionState::new(&env)
            .tick(&[report((30.0, -100.0), (35.0, -90.0))], &env)
            .state;
        let widget_view = *state.viewport();

        let state = state
            .tick(
                &[Event::LandmarkSelected(Some("Indianapolis".to_string()))],
                &env,
            )
            .state;
        assert_eq!(state.viewport().center, INDIANAPOLIS);

        let state = state
            .tick(&[Event::LandmarkSelected(Some("--NONE--".to_string()))], &env)
            .state;
        assert_eq!(*state.viewport(), widget_view);
        assert_eq!(state.landmark(), None);
    }

    #[test]
    fn unknown_landmark_is_ignored() {
        let env = env();
        let transition = SessionState::new(&env).tick(
            &[Event::LandmarkSelected(Some("Gotham".to_string()))],
            &env,
        );
        assert!(!transition.trace.contains(&Phase::Overridden));
        assert_eq!(*transition.state.viewport(), env.default_view);
    }

    #[test]
    fn malformed_report_falls_back() {
        let env = env();
        let garbage = Event::ViewportChanged(ViewportReport::from(json!({
            "bounds": {"_southWest": {"lat": "north", "lng": 1.0}},
        })));

        let state = SessionState::new(&env).tick(&[garbage.clone()], &env).state;
        assert_eq!(*state.viewport(), env.default_view);

        let state = state
            .tick(&[report((30.0, -100.0), (35.0, -90.0))], &env)
            .state;
        let valid = *state.viewport();
        let state = state.tick(&[garbage], &env).state;
        assert_eq!(*state.viewport(), valid, "last valid report is kept");
    }

    #[test]
    fn failure_keeps_held_result_and_retries() {
        let env = env();
        let (state, _) = settle(SessionState::new(&env), &[], &["private"], &env);
        let held = state.held_parameters().cloned();

        let transition = state.tick(&[report((30.0, -100.0), (35.0, -90.0))], &env);
        let params = queries(&transition.effects)[0].clone();
        let error = QueryExecutionError {
            table: GeometryKind::Point,
            source: StoreError::new("timeout"),
        };
        let failed = transition
            .state
            .complete(&params, Err(error.clone()), &env);

        assert_eq!(failed.effects, [Effect::ReportError(error.clone())]);
        assert_eq!(failed.state.phase(), Phase::HasViewport);
        assert_eq!(failed.state.last_error(), Some(&error));
        assert_eq!(failed.state.held_parameters().cloned(), held);
        assert!(failed.state.overlay().is_some());

        let retry = failed.state.tick(&[], &env);
        assert_eq!(queries(&retry.effects).len(), 1);
    }

    #[test]
    fn superseded_completion_is_ignored() {
        let env = env();
        let transition = SessionState::new(&env).tick(&[], &env);
        let stale = QueryParameters {
            row_cap: 5,
            ..queries(&transition.effects)[0].clone()
        };

        let done = transition.state.complete(&stale, Ok(document(&["x"])), &env);
        assert!(done.effects.is_empty());
        assert!(done.state.overlay().is_none());
        assert_eq!(done.state.phase(), Phase::QueryPending);
    }

    #[test]
    fn rerun_re_renders_identically() {
        let env = env();
        let (state, _) = settle(SessionState::new(&env), &[], &["private", "yes"], &env);

        let first = state.tick(&[Event::Rerun], &env);
        let second = first.state.tick(&[Event::Rerun], &env);

        assert!(queries(&first.effects).is_empty());
        assert_eq!(first.effects, second.effects);
        assert!(matches!(first.effects[0], Effect::Render(_)));
    }

    #[test]
    fn tag_filter_restricts_styled_rows() {
        let env = env();
        let tags: TagSet = std::iter::once("private".to_string()).collect();
        let filters = Filters {
            tags: Some(tags),
            ..env.options.default_filters()
        };
        let (state, _) = settle(
            SessionState::new(&env),
            &[Event::FiltersChanged(filters)],
            &["private", "permissive"],
            &env,
        );
        assert_eq!(state.overlay().unwrap().len(), 1);
    }

    #[test]
    fn events_parse_from_tagged_json() {
        let events: Vec<Event> = serde_json::from_value(json!([
            {"type": "viewportChanged", "data": {"bounds": null, "zoom": "x"}},
            {"type": "filtersChanged", "data": {"table": "Line", "column": "highway", "rowCap": 100}},
            {"type": "landmarkSelected", "data": null},
            {"type": "rerun"},
        ]))
        .unwrap();

        assert_eq!(events[0], Event::ViewportChanged(ViewportReport::default()));
        assert!(matches!(
            &events[1],
            Event::FiltersChanged(f) if f.table == GeometryKind::Line && f.tags.is_none()
        ));
        assert_eq!(events[2], Event::LandmarkSelected(None));
        assert_eq!(events[3], Event::Rerun);
    }
}
