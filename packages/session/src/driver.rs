//! Carries out machine effects against the cache, the store and the user
//! surfaces.

use std::sync::Arc;

use osm_explorer_geometry_models::QueryParameters;
use osm_explorer_query::{QueryCache, QueryExecutionError, QueryReport, build_and_execute};
use osm_explorer_store::GeometryStore;

use crate::{
    Environment,
    control_panel::ControlPanel,
    machine::{Effect, Event, Phase, SessionState},
    widget::{MapWidget, Overlay},
};

/// Everything a tick produced besides the new state.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// Effects in the order they were raised, query effects included.
    pub effects: Vec<Effect>,
    /// One report per executed (or cache-served) query.
    pub reports: Vec<QueryReport>,
    /// Phases entered, in order.
    pub trace: Vec<Phase>,
}

impl TickOutcome {
    /// Pushes the outcome to the widget and the control panel.
    ///
    /// Empty overlays are never rendered.
    pub fn apply(&self, widget: &mut dyn MapWidget, panel: &mut dyn ControlPanel) {
        for report in &self.reports {
            panel.query_report(report);
        }
        for effect in &self.effects {
            match effect {
                Effect::SetView { center, zoom } => widget.set_view(*center, *zoom),
                Effect::Render(collection) => {
                    if collection.is_empty() {
                        log::debug!("Skipping render of an empty overlay");
                        widget.clear_overlay();
                    } else {
                        widget.render(&Overlay::new(Arc::clone(collection)));
                    }
                }
                Effect::ClearOverlay => widget.clear_overlay(),
                Effect::ReportError(error) => panel.query_error(error),
                Effect::RejectSelection(error) => panel.selection_rejected(error),
                Effect::Query(_) => {}
            }
        }
    }

    /// Whether any query in this tick failed.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.effects
            .iter()
            .any(|effect| matches!(effect, Effect::ReportError(_)))
    }
}

/// Shared, immutable machinery for running ticks: the store, the result
/// cache, and the environment. Cheap to clone.
#[derive(Clone)]
pub struct Driver {
    store: Arc<dyn GeometryStore>,
    cache: Arc<QueryCache>,
    env: Arc<Environment>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("cache", &self.cache)
            .field("env", &self.env)
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Bundles a store, a (possibly shared) result cache and an environment.
    #[must_use]
    pub fn new(
        store: Arc<dyn GeometryStore>,
        cache: Arc<QueryCache>,
        env: Arc<Environment>,
    ) -> Self {
        Self { store, cache, env }
    }

    /// Configuration-derived environment every tick reads.
    #[must_use]
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The geometry store queries run against.
    #[must_use]
    pub fn store(&self) -> &dyn GeometryStore {
        self.store.as_ref()
    }

    /// The result cache shared by every session of this driver.
    #[must_use]
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Serves `params` from the cache, or runs it against the store and
    /// caches the result.
    ///
    /// Failures are not cached.
    ///
    /// # Errors
    ///
    /// Returns [`QueryExecutionError`] if the store query fails.
    pub fn execute(
        &self,
        params: &QueryParameters,
    ) -> Result<(Arc<geojson::FeatureCollection>, QueryReport), QueryExecutionError> {
        if let Some(document) = self.cache.get(params) {
            log::debug!("Cache hit for {}", params.table.table_name());
            let report = QueryReport::from_cache(params, document.features.len());
            return Ok((document, report));
        }

        let executed = build_and_execute(self.store.as_ref(), params)?;
        let document = Arc::new(executed.collection);
        self.cache.put(params.clone(), Arc::clone(&document));
        Ok((document, executed.report))
    }

    /// Runs one tick: folds `events` into `state` and executes every query
    /// the machine asks for.
    #[must_use]
    pub fn run_tick(&self, state: SessionState, events: &[Event]) -> (SessionState, TickOutcome) {
        let transition = state.tick(events, &self.env);
        let mut state = transition.state;
        let mut outcome = TickOutcome {
            effects: Vec::new(),
            reports: Vec::new(),
            trace: transition.trace,
        };

        let mut queue = transition.effects;
        while !queue.is_empty() {
            let mut next = Vec::new();
            for effect in queue {
                if let Effect::Query(params) = &effect {
                    let result = self.execute(params).map(|(document, report)| {
                        outcome.reports.push(report);
                        document
                    });
                    let completion = state.complete(params, result, &self.env);
                    state = completion.state;
                    outcome.trace.extend(completion.trace);
                    next.extend(completion.effects);
                }
                outcome.effects.push(effect);
            }
            queue = next;
        }

        (state, outcome)
    }
}

/// One user's session: a driver plus the state it advances.
#[derive(Debug, Clone)]
pub struct Session {
    driver: Driver,
    state: SessionState,
}

impl Session {
    /// A fresh session in the default view.
    #[must_use]
    pub fn new(driver: Driver) -> Self {
        let state = SessionState::new(driver.env());
        Self { driver, state }
    }

    /// Resumes a session from stored state.
    #[must_use]
    pub const fn resume(driver: Driver, state: SessionState) -> Self {
        Self { driver, state }
    }

    /// State as of the last tick.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// The driver this session ticks with.
    #[must_use]
    pub const fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Consumes the session, returning its state.
    #[must_use]
    pub fn into_state(self) -> SessionState {
        self.state
    }

    /// Runs one tick and applies it to `widget` and `panel`.
    pub fn tick(
        &mut self,
        events: &[Event],
        widget: &mut dyn MapWidget,
        panel: &mut dyn ControlPanel,
    ) -> TickOutcome {
        let (state, outcome) = self.driver.run_tick(std::mem::take(&mut self.state), events);
        self.state = state;
        outcome.apply(widget, panel);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use osm_explorer_config::ExplorerConfig;
    use osm_explorer_geometry_models::{
        AttributeName, Filters, GeometryKind, LatLng, QueryParameters,
    };
    use osm_explorer_store::{
        AttributeValueCount, LandmarkRecord, MemoryStore, QueryDescriptor, StoreError,
    };
    use serde_json::json;

    use super::*;
    use crate::{
        control_panel::RecordingPanel,
        machine::ViewportReport,
        widget::{RecordingWidget, WidgetCall},
    };

    const INDIANAPOLIS: LatLng = LatLng::new(39.768, -86.158);

    struct CountingStore {
        inner: MemoryStore,
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl CountingStore {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl GeometryStore for CountingStore {
        fn feature_collection(
            &self,
            descriptor: &QueryDescriptor,
        ) -> Result<geojson::FeatureCollection, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::new("connection lost"));
            }
            self.inner.feature_collection(descriptor)
        }

        fn attribute_values(
            &self,
            kind: GeometryKind,
            column: &AttributeName,
            min_count: u64,
        ) -> Result<Vec<AttributeValueCount>, StoreError> {
            self.inner.attribute_values(kind, column, min_count)
        }

        fn landmarks(&self) -> Result<Vec<LandmarkRecord>, StoreError> {
            self.inner.landmarks()
        }
    }

    /// 150 named points around downtown Indianapolis plus the capital
    /// marker itself.
    fn points() -> String {
        let mut features = String::new();
        for i in 0..150 {
            let lng = -86.2 + f64::from(i % 15) * 0.005;
            let lat = 39.74 + f64::from(i / 15) * 0.005;
            let access = if i % 3 == 0 { "private" } else { "yes" };
            let amenity = if i % 2 == 0 { "bench" } else { "cafe" };
            write!(
                features,
                r#"{{"type": "Feature", "geometry": {{"type": "Point", "coordinates": [{lng}, {lat}]}},
                   "properties": {{"name": "poi {i}", "access": "{access}", "amenity": "{amenity}", "osm_id": {i}}}}},"#
            )
            .unwrap();
        }
        features.push_str(
            r#"{"type": "Feature", "geometry": {"type": "Point", "coordinates": [-86.158, 39.768]},
                "properties": {"name": "Indianapolis", "capital": "4", "osm_id": 1000}}"#,
        );
        format!(r#"{{"type": "FeatureCollection", "features": [{features}]}}"#)
    }

    fn fixture() -> (Arc<CountingStore>, Session) {
        let mut inner = MemoryStore::new();
        inner.load_geojson(GeometryKind::Point, &points()).unwrap();
        let store = Arc::new(CountingStore {
            inner,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        });

        let config = ExplorerConfig::from_toml_str(Some(
            "[columns]\npoint = [\"ACCESS\", \"AMENITY\"]\n",
        ))
        .unwrap();
        let env = Environment::load(&config, store.as_ref()).unwrap();
        let driver = Driver::new(
            store.clone(),
            Arc::new(QueryCache::new(config.cache_capacity)),
            Arc::new(env),
        );
        (store, Session::new(driver))
    }

    fn indianapolis_view() -> Event {
        Event::ViewportChanged(ViewportReport::from(json!({
            "bounds": {
                "_southWest": {"lat": 39.7, "lng": -86.3},
                "_northEast": {"lat": 39.85, "lng": -86.0},
            },
            "zoom": 12,
        })))
    }

    fn filters(column: &str, row_cap: u32) -> Event {
        Event::FiltersChanged(Filters {
            table: GeometryKind::Point,
            column: AttributeName::new(column).unwrap(),
            tags: None,
            row_cap,
        })
    }

    #[test]
    fn viewport_and_cap_give_one_bounded_query() {
        let (store, mut session) = fixture();
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();

        session.tick(
            &[indianapolis_view(), filters("ACCESS", 100)],
            &mut widget,
            &mut panel,
        );

        assert_eq!(store.calls(), 1);
        assert_eq!(widget.render_count(), 1);
        let overlay = widget.overlay.as_ref().unwrap();
        assert!(!overlay.collection().is_empty());
        assert!(overlay.collection().len() <= 100);
        assert_eq!(panel.reports.len(), 1);
        assert!(!panel.reports[0].cached);
        assert_eq!(panel.reports[0].table_name, "PLANET_OSM_POINT");
        assert_eq!(session.state().phase(), Phase::QuerySatisfied);
    }

    #[test]
    fn unchanged_inputs_do_not_refetch() {
        let (store, mut session) = fixture();
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();

        session.tick(&[indianapolis_view()], &mut widget, &mut panel);
        session.tick(&[indianapolis_view()], &mut widget, &mut panel);
        session.tick(&[], &mut widget, &mut panel);

        assert_eq!(store.calls(), 1);
        assert_eq!(widget.render_count(), 1);
    }

    #[test]
    fn column_change_queries_once_then_hits_cache() {
        let (store, mut session) = fixture();
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();

        session.tick(&[indianapolis_view()], &mut widget, &mut panel);
        let rectangle = session.state().viewport().rectangle;

        session.tick(&[filters("AMENITY", 1000)], &mut widget, &mut panel);
        assert_eq!(store.calls(), 2);
        let held = session.state().held_parameters().unwrap();
        assert_eq!(held.column.as_str(), "AMENITY");
        assert_eq!(held.rectangle, rectangle);
        assert_eq!(
            widget.overlay.as_ref().unwrap().collection().column().as_str(),
            "AMENITY"
        );

        session.tick(&[filters("ACCESS", 1000)], &mut widget, &mut panel);
        assert_eq!(store.calls(), 2, "previous key is served from the cache");
        assert!(panel.reports.last().unwrap().cached);
        assert_eq!(widget.render_count(), 3);
    }

    #[test]
    fn landmark_jump_sets_view_and_queries() {
        let (store, mut session) = fixture();
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();

        session.tick(&[], &mut widget, &mut panel);
        session.tick(
            &[Event::LandmarkSelected(Some("Indianapolis".to_string()))],
            &mut widget,
            &mut panel,
        );

        assert_eq!(widget.view, Some((INDIANAPOLIS, 11)));
        assert_eq!(store.calls(), 2);
        let rectangle = session.state().held_parameters().unwrap().rectangle;
        assert!(rectangle.west() < INDIANAPOLIS.lng && INDIANAPOLIS.lng < rectangle.east());
        assert!(rectangle.south() < INDIANAPOLIS.lat && INDIANAPOLIS.lat < rectangle.north());

        session.tick(&[], &mut widget, &mut panel);
        assert_eq!(session.state().viewport().center, INDIANAPOLIS);
        assert_eq!(store.calls(), 2);
    }

    #[test]
    fn empty_result_clears_without_rendering() {
        let (_, mut session) = fixture();
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();

        session.tick(&[indianapolis_view()], &mut widget, &mut panel);
        session.tick(
            &[Event::ViewportChanged(ViewportReport::from(json!({
                "bounds": {
                    "_southWest": {"lat": 0.0, "lng": -30.0},
                    "_northEast": {"lat": 1.0, "lng": -29.0},
                },
            })))],
            &mut widget,
            &mut panel,
        );

        assert_eq!(widget.render_count(), 1);
        assert_eq!(widget.calls.last(), Some(&WidgetCall::ClearOverlay));
        assert!(widget.overlay.is_none());
        assert_eq!(panel.reports.last().unwrap().rows, 0);
    }

    #[test]
    fn rerun_is_idempotent() {
        let (store, mut session) = fixture();
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();

        session.tick(&[indianapolis_view()], &mut widget, &mut panel);
        session.tick(&[Event::Rerun], &mut widget, &mut panel);
        session.tick(&[Event::Rerun], &mut widget, &mut panel);

        assert_eq!(store.calls(), 1);
        let renders: Vec<_> = widget
            .calls
            .iter()
            .filter(|call| matches!(call, WidgetCall::Render(_)))
            .collect();
        assert_eq!(renders.len(), 3);
        assert!(renders.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn failure_keeps_last_overlay_and_retries() {
        let (store, mut session) = fixture();
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();

        session.tick(&[indianapolis_view()], &mut widget, &mut panel);
        let shown = widget.overlay.clone();

        store.fail.store(true, Ordering::SeqCst);
        let outcome = session.tick(&[filters("AMENITY", 1000)], &mut widget, &mut panel);
        assert!(outcome.has_error());
        assert_eq!(panel.errors.len(), 1);
        assert_eq!(widget.overlay, shown);
        assert!(session.state().last_error().is_some());
        assert_eq!(session.driver().cache().len(), 1, "failures are not cached");

        store.fail.store(false, Ordering::SeqCst);
        session.tick(&[], &mut widget, &mut panel);
        assert_eq!(store.calls(), 3);
        assert!(session.state().last_error().is_none());
        assert_eq!(
            widget.overlay.as_ref().unwrap().collection().column().as_str(),
            "AMENITY"
        );
    }

    #[test]
    fn malformed_first_report_uses_default_view() {
        let (_, mut session) = fixture();
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();

        session.tick(
            &[Event::ViewportChanged(ViewportReport::from(json!({"zoom": 3})))],
            &mut widget,
            &mut panel,
        );

        let default_view = session.driver().env().default_view;
        assert_eq!(*session.state().viewport(), default_view);
        assert_eq!(
            session.state().held_parameters().map(|p| p.rectangle),
            Some(default_view.rectangle)
        );
    }

    #[test]
    fn sessions_share_the_cache() {
        let (store, mut first) = fixture();
        let mut second = Session::new(first.driver().clone());
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();

        first.tick(&[indianapolis_view()], &mut widget, &mut panel);
        second.tick(&[indianapolis_view()], &mut widget, &mut panel);

        assert_eq!(store.calls(), 1);
        assert!(panel.reports[1].cached);
    }

    #[test]
    fn execute_reports_query_text() {
        let (_, session) = fixture();
        let params = QueryParameters::new(
            session.state().filters(),
            session.driver().env().default_view.rectangle,
        );
        let (_, report) = session.driver().execute(&params).unwrap();
        assert!(report.query.contains("PLANET_OSM_POINT"));
        assert!(report.query.contains("LIMIT 1000"));
    }

    #[test]
    fn refused_selection_reaches_the_panel() {
        let (store, mut session) = fixture();
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();
        session.tick(&[indianapolis_view()], &mut widget, &mut panel);
        let before = session.state().filters().clone();

        let outcome = session.tick(&[filters("NOT_A_COLUMN", 7)], &mut widget, &mut panel);

        assert_eq!(panel.rejected.len(), 1);
        assert!(!outcome.has_error());
        assert_eq!(session.state().filters(), &before);
        assert_eq!(store.calls(), 1);
    }

    #[test]
    fn driver_debug_shows_cache() {
        let (_, session) = fixture();
        let text = format!("{:?}", session.driver());
        assert!(text.contains("QueryCache"));
        assert!(text.contains("capacity: 128"));
    }
}
