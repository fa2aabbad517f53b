#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Capital/landmark locator.
//!
//! Holds a table of named landmarks and resolves a selection to the map
//! center and zoom a "jump to" should apply.

use std::collections::BTreeMap;

use osm_explorer_geometry_models::LatLng;
use osm_explorer_store::{GeometryStore, LandmarkRecord, StoreError};
use serde::Serialize;

/// Selector entry meaning "no landmark selected".
pub const NO_SELECTION: &str = "--NONE--";

/// Zoom level applied when jumping to a landmark.
pub const LANDMARK_ZOOM: u8 = 11;

/// The requested landmark is not in the table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown landmark: {name}")]
pub struct UnknownLandmarkError {
    /// The requested name.
    pub name: String,
}

/// Where a landmark jump moves the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LandmarkLocation {
    /// New map center.
    pub center: LatLng,
    /// New map zoom.
    pub zoom: u8,
}

/// Whether `name` means "no selection".
#[must_use]
pub fn is_no_selection(name: Option<&str>) -> bool {
    name.is_none_or(|name| name.is_empty() || name == NO_SELECTION)
}

/// Name -> location table of landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct Locator {
    landmarks: BTreeMap<String, LatLng>,
    zoom: u8,
}

impl Default for Locator {
    fn default() -> Self {
        Self {
            landmarks: BTreeMap::new(),
            zoom: LANDMARK_ZOOM,
        }
    }
}

impl Locator {
    /// Builds a locator from landmark records. Later duplicates win.
    #[must_use]
    pub fn new(records: impl IntoIterator<Item = LandmarkRecord>) -> Self {
        Self {
            landmarks: records
                .into_iter()
                .map(|record| (record.name, record.location))
                .collect(),
            zoom: LANDMARK_ZOOM,
        }
    }

    /// Loads the landmark table from a store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot list landmarks.
    pub fn from_store(store: &dyn GeometryStore) -> Result<Self, StoreError> {
        let locator = Self::new(store.landmarks()?);
        log::info!("Loaded {} landmark(s)", locator.len());
        Ok(locator)
    }

    /// Overrides the jump zoom level.
    #[must_use]
    pub const fn with_zoom(mut self, zoom: u8) -> Self {
        self.zoom = zoom;
        self
    }

    /// Jump zoom level.
    #[must_use]
    pub const fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Landmark names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.landmarks.keys().map(String::as_str)
    }

    /// Selector choices: [`NO_SELECTION`] followed by every name.
    #[must_use]
    pub fn choices(&self) -> Vec<String> {
        std::iter::once(NO_SELECTION)
            .chain(self.names())
            .map(ToString::to_string)
            .collect()
    }

    /// Number of landmarks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Resolves a selection.
    ///
    /// `None`, an empty name and [`NO_SELECTION`] resolve to `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownLandmarkError`] if `name` is not in the table.
    pub fn resolve(
        &self,
        name: Option<&str>,
    ) -> Result<Option<LandmarkLocation>, UnknownLandmarkError> {
        if is_no_selection(name) {
            return Ok(None);
        }
        let name = name.unwrap_or_default();

        self.landmarks
            .get(name)
            .map(|&center| {
                Some(LandmarkLocation {
                    center,
                    zoom: self.zoom,
                })
            })
            .ok_or_else(|| UnknownLandmarkError {
                name: name.to_string(),
            })
    }
}
