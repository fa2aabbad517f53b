#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Explorer configuration.
//!
//! Defaults are compiled in from `config/default.toml` and
//! `config/columns.toml`. A TOML file named by `OSM_EXPLORER_CONFIG` may
//! override any key (tables are merged key by key), and
//! `OSM_EXPLORER_DATA` overrides the data directory.

use std::path::{Path, PathBuf};

use osm_explorer_geometry_models::{
    AttributeName, BoundingRectangle, GeometryKind, InvalidRectangleError, LatLng,
};
use serde::{Deserialize, Serialize};

/// Environment variable naming an override TOML file.
pub const CONFIG_ENV: &str = "OSM_EXPLORER_CONFIG";

/// Environment variable overriding the data directory.
pub const DATA_ENV: &str = "OSM_EXPLORER_DATA";

const DEFAULT_TOML: &str = include_str!("../config/default.toml");
const COLUMNS_TOML: &str = include_str!("../config/columns.toml");

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The override file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// TOML syntax or shape error.
    #[error("Invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// Default view bounds are inverted or not finite.
    #[error("Invalid default view bounds: {0}")]
    Bounds(#[from] InvalidRectangleError),
    /// A value is out of range.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// The view shown before the map widget reports anything.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefaultView {
    /// Map center.
    pub center: LatLng,
    /// Map zoom.
    pub zoom: u8,
    /// South-west corner of the default bounds.
    pub south_west: LatLng,
    /// North-east corner of the default bounds.
    pub north_east: LatLng,
}

impl DefaultView {
    /// The default bounds as a rectangle.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRectangleError`] if the corners are not finite.
    pub fn rectangle(&self) -> Result<BoundingRectangle, InvalidRectangleError> {
        BoundingRectangle::from_corners(self.south_west, self.north_east)
    }
}

/// Map widget size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Row cap choices offered by the control panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCaps {
    /// Allowed caps, in selector order.
    pub choices: Vec<u32>,
    /// Initially selected cap.
    pub default: u32,
}

/// Attribute columns offered per geometry table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRegistry {
    /// Columns of the point table.
    pub point: Vec<AttributeName>,
    /// Columns of the line table.
    pub line: Vec<AttributeName>,
    /// Columns of the polygon table.
    pub polygon: Vec<AttributeName>,
}

impl ColumnRegistry {
    /// Columns allowed for `kind`, in selector order.
    #[must_use]
    pub fn for_kind(&self, kind: GeometryKind) -> &[AttributeName] {
        match kind {
            GeometryKind::Point => &self.point,
            GeometryKind::Line => &self.line,
            GeometryKind::Polygon => &self.polygon,
        }
    }

    /// Whether `column` is allowed for `kind`.
    #[must_use]
    pub fn allows(&self, kind: GeometryKind, column: &AttributeName) -> bool {
        self.for_kind(kind).contains(column)
    }
}

/// Complete explorer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorerConfig {
    /// Decimal places viewport bounds are quantized to.
    pub precision: u32,
    /// Query result cache capacity.
    pub cache_capacity: usize,
    /// Zoom applied on a landmark jump.
    pub landmark_zoom: u8,
    /// Minimum occurrences for an attribute value to be a tag choice.
    pub min_tag_count: u64,
    /// Directory holding the `GeoJSON` tables.
    pub data_dir: PathBuf,
    /// `DuckDB` warehouse file, used instead of `data_dir` when set.
    #[serde(default)]
    pub duckdb_path: Option<PathBuf>,
    /// Palette override.
    #[serde(default)]
    pub palette: Option<Vec<String>>,
    /// Default view.
    pub default_view: DefaultView,
    /// Map widget size.
    pub map: MapSize,
    /// Row cap choices.
    pub row_caps: RowCaps,
    /// Allowed columns per table.
    pub columns: ColumnRegistry,
}

impl Default for ExplorerConfig {
    /// The compiled-in defaults.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is invalid. These files are compile-time
    /// constants, so a failure is a development error.
    fn default() -> Self {
        Self::from_toml_str(None)
            .unwrap_or_else(|e| panic!("Failed to parse embedded default config: {e}"))
    }
}

/// Merges `overlay` into `base`, recursing into tables.
fn merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) =
            (base.get_mut(&key), &value)
        {
            merge(existing, incoming.clone());
            continue;
        }
        base.insert(key, value);
    }
}

impl ExplorerConfig {
    /// Parses the defaults with an optional override document on top.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any document is invalid TOML, the merged
    /// document does not describe a configuration, or validation fails.
    pub fn from_toml_str(overrides: Option<&str>) -> Result<Self, ConfigError> {
        let mut table: toml::Table = toml::de::from_str(DEFAULT_TOML)?;
        let columns: toml::Table = toml::de::from_str(COLUMNS_TOML)?;
        table.insert("columns".to_string(), toml::Value::Table(columns));

        if let Some(overrides) = overrides {
            merge(&mut table, toml::de::from_str(overrides)?);
        }

        let config = toml::Value::Table(table).try_into::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the defaults plus the override file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loading config overrides from {}", path.display());
        Self::from_toml_str(Some(&text))
    }

    /// Loads configuration honoring [`CONFIG_ENV`] and [`DATA_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the override file cannot be read or the
    /// result is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::from_toml_str(None)?,
        };
        if let Some(dir) = std::env::var_os(DATA_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        log::debug!("Config: {config:?}");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.precision > 9 {
            return Err(ConfigError::Invalid(format!(
                "precision must be at most 9, got {}",
                self.precision
            )));
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache_capacity must be positive".to_string(),
            ));
        }
        if self.row_caps.choices.is_empty() || self.row_caps.choices.contains(&0) {
            return Err(ConfigError::Invalid(
                "row_caps.choices must be non-empty positive caps".to_string(),
            ));
        }
        if !self.row_caps.choices.contains(&self.row_caps.default) {
            return Err(ConfigError::Invalid(format!(
                "row_caps.default {} is not one of {:?}",
                self.row_caps.default, self.row_caps.choices
            )));
        }
        if self.palette.as_ref().is_some_and(Vec::is_empty) {
            return Err(ConfigError::Invalid("palette must not be empty".to_string()));
        }
        if self.map.width == 0 || self.map.height == 0 {
            return Err(ConfigError::Invalid("map size must be non-zero".to_string()));
        }
        for &kind in GeometryKind::all() {
            if self.columns.for_kind(kind).is_empty() {
                return Err(ConfigError::Invalid(format!("no columns configured for {kind}")));
            }
        }
        self.default_view.rectangle()?;
        Ok(())
    }
}
