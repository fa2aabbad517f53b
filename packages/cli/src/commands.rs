//! Non-interactive command implementations shared by the subcommands and
//! the interactive menu.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use osm_explorer_config::{ConfigError, ExplorerConfig};
use osm_explorer_geometry_models::{BoundingRectangle, Filters};
use osm_explorer_query::{QueryCache, QueryReport};
use osm_explorer_session::{
    Driver, Environment, Event, Overlay, RecordingPanel, RecordingWidget, Session, ViewportReport,
};

/// Where a one-shot query looks.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewRequest {
    /// The configured default view.
    Default,
    /// An explicit rectangle.
    Bounds(BoundingRectangle),
    /// A named landmark.
    Landmark(String),
}

/// The outcome of a one-shot query.
#[derive(Debug, Clone)]
pub struct QueryOutput {
    /// Styled overlay; `None` when nothing matched.
    pub overlay: Option<Overlay>,
    /// Query reports.
    pub reports: Vec<QueryReport>,
}

/// Loads configuration, applying command-line overrides on top.
///
/// # Errors
///
/// Returns [`ConfigError`] if the configuration cannot be loaded.
pub fn load_config(
    path: Option<&Path>,
    data: Option<PathBuf>,
    duckdb: Option<PathBuf>,
) -> Result<ExplorerConfig, ConfigError> {
    let mut config = match path {
        Some(path) => ExplorerConfig::from_file(path)?,
        None => ExplorerConfig::load()?,
    };
    if let Some(data) = data {
        config.data_dir = data;
    }
    if duckdb.is_some() {
        config.duckdb_path = duckdb;
    }
    Ok(config)
}

/// Opens the configured store and wraps it in a driver.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or landmarks cannot be
/// loaded.
pub fn driver(config: &ExplorerConfig) -> Result<Driver, Box<dyn Error>> {
    let store = osm_explorer_server::open_store(config)?;
    let env = Environment::load(config, store.as_ref())?;
    Ok(Driver::new(
        store,
        Arc::new(QueryCache::new(config.cache_capacity)),
        Arc::new(env),
    ))
}

/// Parses `"west,south,east,north"`.
///
/// # Errors
///
/// Returns an error if there are not four numbers or they do not form a
/// rectangle.
pub fn parse_bbox(s: &str) -> Result<BoundingRectangle, Box<dyn Error>> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()?;
    let [west, south, east, north] = parts[..] else {
        return Err(format!("expected west,south,east,north, got {s:?}").into());
    };
    Ok(BoundingRectangle::new(west, south, east, north)?)
}

fn viewport_event(rectangle: &BoundingRectangle) -> Event {
    Event::ViewportChanged(ViewportReport {
        bounds: Some(serde_json::json!({
            "southWest": {"lat": rectangle.south(), "lng": rectangle.west()},
            "northEast": {"lat": rectangle.north(), "lng": rectangle.east()},
        })),
        zoom: None,
        center: Some(rectangle.center()),
    })
}

/// Runs one query through a fresh session, exactly as the map would.
///
/// # Errors
///
/// Returns an error if the selections are not offered, the landmark is
/// unknown, or the store query fails.
pub fn run_query(
    driver: &Driver,
    filters: Filters,
    view: &ViewRequest,
) -> Result<QueryOutput, Box<dyn Error>> {
    let env = driver.env();
    env.options.validate(&filters)?;

    let mut events = vec![Event::FiltersChanged(filters)];
    match view {
        ViewRequest::Default => {}
        ViewRequest::Bounds(rectangle) => events.push(viewport_event(rectangle)),
        ViewRequest::Landmark(name) => {
            env.locator.resolve(Some(name.as_str()))?;
            events.push(Event::LandmarkSelected(Some(name.clone())));
        }
    }

    let mut session = Session::new(driver.clone());
    let mut widget = RecordingWidget::default();
    let mut panel = RecordingPanel::default();
    session.tick(&events, &mut widget, &mut panel);

    if let Some(error) = panel.rejected.pop() {
        return Err(error.into());
    }
    if let Some(error) = panel.errors.pop() {
        return Err(error.into());
    }
    Ok(QueryOutput {
        overlay: widget.overlay,
        reports: panel.reports,
    })
}

/// Prints a query report the way the control panel shows it.
pub fn print_report(report: &QueryReport) {
    eprintln!(
        "{}: {} row(s) in {:.3}s{}",
        report.table_name,
        report.rows,
        report.response_time.as_secs_f64(),
        if report.cached { " (cached)" } else { "" }
    );
    log::debug!("Query:\n{}", report.query);
}

/// Writes the styled overlay as `GeoJSON` to `output`, or stdout.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_overlay(
    overlay: Option<&Overlay>,
    output: Option<&Path>,
    pretty: bool,
) -> Result<(), Box<dyn Error>> {
    let Some(overlay) = overlay else {
        eprintln!("No features matched.");
        return Ok(());
    };

    let document = overlay.collection().to_geojson();
    let text = if pretty {
        serde_json::to_string_pretty(&document)?
    } else {
        serde_json::to_string(&document)?
    };

    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            eprintln!(
                "Wrote {} feature(s) to {}",
                overlay.collection().len(),
                path.display()
            );
        }
        None => println!("{text}"),
    }
    Ok(())
}
