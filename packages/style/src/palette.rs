//! Color palette and per-value color assignment.

use std::collections::BTreeMap;

use serde::Serialize;

/// Qualitative palette used when none is configured.
pub const DEFAULT_PALETTE: &[&str] = &[
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

/// A CSS color string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ColorToken(String);

impl ColorToken {
    /// Wraps a CSS color string.
    #[must_use]
    pub fn new(color: impl Into<String>) -> Self {
        Self(color.into())
    }

    /// The color string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ColorToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returned when a palette would have no colors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("palette must contain at least one color")]
pub struct EmptyPaletteError;

/// A fixed, non-empty, ordered list of colors, cycled by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<ColorToken>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            colors: DEFAULT_PALETTE.iter().copied().map(ColorToken::new).collect(),
        }
    }
}

impl Palette {
    /// Creates a palette from color strings.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyPaletteError`] if `colors` is empty.
    pub fn new<S: Into<String>>(
        colors: impl IntoIterator<Item = S>,
    ) -> Result<Self, EmptyPaletteError> {
        let colors: Vec<ColorToken> = colors.into_iter().map(ColorToken::new).collect();
        if colors.is_empty() {
            return Err(EmptyPaletteError);
        }
        Ok(Self { colors })
    }

    /// Color for the `index`-th distinct value (`palette[index mod len]`).
    #[must_use]
    pub fn color(&self, index: usize) -> &ColorToken {
        &self.colors[index % self.colors.len()]
    }

    /// Number of colors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always `false`; palettes are never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// One value -> color pair of a [`ColorAssignment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorEntry {
    /// Attribute value.
    pub value: String,
    /// Assigned color.
    pub color: ColorToken,
}

/// Attribute value -> color mapping, in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ColorAssignment {
    entries: Vec<ColorEntry>,
    /// Value -> position in `entries`.
    #[serde(skip)]
    index: BTreeMap<String, usize>,
}

impl ColorAssignment {
    /// Assigns `palette[i mod len]` to the `i`-th distinct value of `values`.
    #[must_use]
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a str>, palette: &Palette) -> Self {
        let mut colors = Self::default();
        for value in values {
            if colors.index.contains_key(value) {
                continue;
            }
            let position = colors.entries.len();
            colors.index.insert(value.to_string(), position);
            colors.entries.push(ColorEntry {
                value: value.to_string(),
                color: palette.color(position).clone(),
            });
        }
        colors
    }

    /// Color assigned to `value`.
    #[must_use]
    pub fn get(&self, value: &str) -> Option<&ColorToken> {
        self.index.get(value).map(|&i| &self.entries[i].color)
    }

    /// Entries in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = &ColorEntry> {
        self.entries.iter()
    }

    /// Number of distinct values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no value has been assigned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
