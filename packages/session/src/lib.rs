#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! View state machine and its loop driver.
//!
//! Every interaction with the map widget or control panel becomes a typed
//! [`Event`]. A tick folds one batch of events into a [`SessionState`] and
//! yields [`Effect`]s; the [`Driver`] executes the effects (cache lookups,
//! store queries, widget calls) and feeds query outcomes back into the
//! machine. The machine itself never touches the store or a widget.

pub mod control_panel;
pub mod driver;
pub mod machine;
pub mod widget;

use osm_explorer_config::ExplorerConfig;
use osm_explorer_geometry_models::{InvalidRectangleError, ViewportState};
use osm_explorer_landmark::{LandmarkLocation, Locator};
use osm_explorer_normalize::{
    DEFAULT_CENTER, DEFAULT_PRECISION, DEFAULT_ZOOM, Normalizer, default_rectangle, mercator,
};
use osm_explorer_store::{GeometryStore, StoreError};
use osm_explorer_style::{EmptyPaletteError, Palette, Styler};

pub use control_panel::{ControlPanel, ControlPanelOptions, RecordingPanel, SelectionError};
pub use driver::{Driver, Session, TickOutcome};
pub use machine::{Effect, Event, Phase, SessionState, Transition, ViewportReport};
pub use widget::{MapWidget, Overlay, RecordingWidget, WidgetCall};

/// Errors assembling a session environment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// The landmark table could not be loaded.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The configured palette is empty.
    #[error(transparent)]
    Palette(#[from] EmptyPaletteError),
    /// The configured default view is not a valid rectangle.
    #[error(transparent)]
    Bounds(#[from] InvalidRectangleError),
}

/// Map widget size in pixels.
pub const DEFAULT_MAP_SIZE: (u32, u32) = (1000, 700);

/// Everything a tick reads but never changes.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Viewport quantizer.
    pub normalizer: Normalizer,
    /// Landmark table.
    pub locator: Locator,
    /// Feature styler.
    pub styler: Styler,
    /// Control panel choices.
    pub options: ControlPanelOptions,
    /// View used before any valid widget report.
    pub default_view: ViewportState,
    /// Map widget size in pixels (width, height).
    pub map_size: (u32, u32),
}

impl Default for Environment {
    fn default() -> Self {
        let normalizer = Normalizer::new(DEFAULT_PRECISION);
        Self {
            default_view: ViewportState {
                rectangle: normalizer.quantize(&default_rectangle()),
                zoom: DEFAULT_ZOOM,
                center: DEFAULT_CENTER,
            },
            normalizer,
            locator: Locator::default(),
            styler: Styler::default(),
            options: ControlPanelOptions::default(),
            map_size: DEFAULT_MAP_SIZE,
        }
    }
}

impl Environment {
    /// Builds the environment from configuration and a landmark table.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the palette or default view is invalid.
    pub fn from_config(config: &ExplorerConfig, locator: Locator) -> Result<Self, SessionError> {
        let normalizer = Normalizer::new(config.precision);
        let styler = Styler::new(match &config.palette {
            Some(colors) => Palette::new(colors.iter().cloned())?,
            None => Palette::default(),
        });
        let locator = locator.with_zoom(config.landmark_zoom);

        Ok(Self {
            default_view: ViewportState {
                rectangle: normalizer.quantize(&config.default_view.rectangle()?),
                zoom: config.default_view.zoom,
                center: config.default_view.center,
            },
            normalizer,
            options: ControlPanelOptions::from_config(config, &locator),
            locator,
            styler,
            map_size: (config.map.width, config.map.height),
        })
    }

    /// Builds the environment, loading landmarks from `store`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if landmarks cannot be loaded or the
    /// configuration is invalid.
    pub fn load(config: &ExplorerConfig, store: &dyn GeometryStore) -> Result<Self, SessionError> {
        Self::from_config(config, Locator::from_store(store)?)
    }

    /// Replaces the landmark table, keeping the configured jump zoom.
    #[must_use]
    pub fn with_locator(mut self, locator: Locator) -> Self {
        self.options = self.options.with_landmarks(locator.choices());
        self.locator = locator.with_zoom(self.locator.zoom());
        self
    }

    /// The viewport a jump to `location` produces: the landmark center and
    /// zoom, with the rectangle a map of [`Environment::map_size`] shows
    /// there.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRectangleError`] if the location is not finite.
    pub fn landmark_viewport(
        &self,
        location: LandmarkLocation,
    ) -> Result<ViewportState, InvalidRectangleError> {
        let (width, height) = self.map_size;
        let rectangle =
            mercator::viewport_rectangle(location.center, location.zoom, width, height)?;
        Ok(ViewportState {
            rectangle: self.normalizer.quantize(&rectangle),
            zoom: location.zoom,
            center: location.center,
        })
    }
}
