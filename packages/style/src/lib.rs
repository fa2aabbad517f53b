#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Feature styling engine.
//!
//! Turns raw store rows into styled [`Feature`]s: each distinct attribute
//! value gets a palette color in first-occurrence order, and every feature
//! carries the stroke/fill style a map overlay should draw it with.
//!
//! Coloring is a pure function of the row sequence and the tag filter, so
//! repeated calls on the same input produce identical assignments.

pub mod palette;

use osm_explorer_geometry_models::{
    AttributeName, FeatureRow, NAME_PROPERTY, OSM_ID_PROPERTY, TAGS_PROPERTY, TagSet,
};
use serde::Serialize;

pub use palette::{
    ColorAssignment, ColorEntry, ColorToken, DEFAULT_PALETTE, EmptyPaletteError, Palette,
};

/// Stroke weight for point features.
pub const POINT_WEIGHT: u32 = 10;

/// Property holding a feature's assigned color in exported `GeoJSON`.
pub const COLOR_PROPERTY: &str = "color";

/// Property holding a feature's style object in exported `GeoJSON`.
pub const STYLE_PROPERTY: &str = "style";

/// How a map overlay should draw one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStyle {
    /// Stroke color.
    pub color: ColorToken,
    /// Fill color.
    pub fill_color: ColorToken,
    /// Stroke weight, set for points only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

impl FeatureStyle {
    /// Style for a feature with `geometry` drawn in `color`.
    #[must_use]
    pub fn for_geometry(geometry: &geojson::Geometry, color: &ColorToken) -> Self {
        let is_point = matches!(
            geometry.value,
            geojson::Value::Point(_) | geojson::Value::MultiPoint(_)
        );
        Self {
            color: color.clone(),
            fill_color: color.clone(),
            weight: is_point.then_some(POINT_WEIGHT),
        }
    }
}

/// A labelled property shown in a feature popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopupField {
    /// Property name.
    pub field: String,
    /// Label shown before the value.
    pub label: String,
}

/// Popup fields for features colored by `column`: the name, then the column.
#[must_use]
pub fn popup_fields(column: &AttributeName) -> Vec<PopupField> {
    [NAME_PROPERTY, column.as_str()]
        .into_iter()
        .map(|field| PopupField {
            field: field.to_string(),
            label: format!("{field}:"),
        })
        .collect()
}

/// A styled feature. Only produced by [`Styler::style`].
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    geometry: geojson::Geometry,
    name: String,
    attribute_value: String,
    color: ColorToken,
    style: FeatureStyle,
    tags: Option<String>,
    osm_id: Option<i64>,
}

impl Feature {
    /// The feature geometry.
    #[must_use]
    pub const fn geometry(&self) -> &geojson::Geometry {
        &self.geometry
    }

    /// The feature name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the styled attribute column.
    #[must_use]
    pub fn attribute_value(&self) -> &str {
        &self.attribute_value
    }

    /// Color assigned to the attribute value.
    #[must_use]
    pub const fn color(&self) -> &ColorToken {
        &self.color
    }

    /// Overlay style.
    #[must_use]
    pub const fn style(&self) -> &FeatureStyle {
        &self.style
    }

    fn to_geojson(&self, column: &AttributeName) -> geojson::Feature {
        let mut properties = geojson::JsonObject::new();
        properties.insert(NAME_PROPERTY.to_string(), self.name.clone().into());
        properties.insert(
            column.as_str().to_string(),
            self.attribute_value.clone().into(),
        );
        properties.insert(TAGS_PROPERTY.to_string(), self.tags.clone().into());
        properties.insert(OSM_ID_PROPERTY.to_string(), self.osm_id.into());
        properties.insert(
            COLOR_PROPERTY.to_string(),
            self.color.as_str().to_string().into(),
        );
        properties.insert(
            STYLE_PROPERTY.to_string(),
            serde_json::to_value(&self.style).unwrap_or_default(),
        );

        geojson::Feature {
            bbox: None,
            geometry: Some(self.geometry.clone()),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// An ordered sequence of styled features plus a properties bag.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    column: AttributeName,
    features: Vec<Feature>,
    properties: geojson::JsonObject,
    colors: ColorAssignment,
}

impl FeatureCollection {
    /// Styled features, in row order.
    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Collection-level properties: the styled column and feature count.
    #[must_use]
    pub const fn properties(&self) -> &geojson::JsonObject {
        &self.properties
    }

    /// The value -> color assignment used for this collection.
    #[must_use]
    pub const fn colors(&self) -> &ColorAssignment {
        &self.colors
    }

    /// The attribute column features were colored by.
    #[must_use]
    pub const fn column(&self) -> &AttributeName {
        &self.column
    }

    /// Popup fields for this collection.
    #[must_use]
    pub fn popup_fields(&self) -> Vec<PopupField> {
        popup_fields(&self.column)
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether there is nothing to draw.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Exports the collection as `GeoJSON`, with each feature's color and
    /// style stored in its properties.
    #[must_use]
    pub fn to_geojson(&self) -> geojson::FeatureCollection {
        let mut foreign_members = geojson::JsonObject::new();
        foreign_members.insert(
            "properties".to_string(),
            serde_json::Value::Object(self.properties.clone()),
        );

        geojson::FeatureCollection {
            bbox: None,
            features: self
                .features
                .iter()
                .map(|f| f.to_geojson(&self.column))
                .collect(),
            foreign_members: Some(foreign_members),
        }
    }
}

/// Colors rows with a fixed palette.
#[derive(Debug, Clone, Default)]
pub struct Styler {
    palette: Palette,
}

impl Styler {
    /// Creates a styler using `palette`.
    #[must_use]
    pub const fn new(palette: Palette) -> Self {
        Self { palette }
    }

    /// The palette in use.
    #[must_use]
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Styles `rows` colored by `column`.
    ///
    /// When `tag_filter` is a non-empty set, rows whose attribute value is
    /// not in it are dropped before colors are assigned.
    #[must_use]
    pub fn style(
        &self,
        rows: &[FeatureRow],
        column: &AttributeName,
        tag_filter: Option<&TagSet>,
    ) -> FeatureCollection {
        let filter = tag_filter.filter(|tags| !tags.is_empty());
        let kept: Vec<&FeatureRow> = rows
            .iter()
            .filter(|row| filter.is_none_or(|tags| tags.contains(&row.attribute_value)))
            .collect();

        let colors = ColorAssignment::from_values(
            kept.iter().map(|row| row.attribute_value.as_str()),
            &self.palette,
        );

        let features: Vec<Feature> = kept
            .into_iter()
            .filter_map(|row| {
                let color = colors.get(&row.attribute_value)?.clone();
                Some(Feature {
                    style: FeatureStyle::for_geometry(&row.geometry, &color),
                    geometry: row.geometry.clone(),
                    name: row.name.clone(),
                    attribute_value: row.attribute_value.clone(),
                    color,
                    tags: row.tags.clone(),
                    osm_id: row.osm_id,
                })
            })
            .collect();

        log::debug!(
            "Styled {} feature(s) with {} color(s) by {column}",
            features.len(),
            colors.len()
        );

        let mut properties = geojson::JsonObject::new();
        properties.insert("column".to_string(), column.as_str().to_string().into());
        properties.insert("featureCount".to_string(), features.len().into());

        FeatureCollection {
            column: column.clone(),
            features,
            properties,
            colors,
        }
    }

    /// Styles a raw store document, skipping features without a name,
    /// value, or geometry.
    #[must_use]
    pub fn style_document(
        &self,
        document: &geojson::FeatureCollection,
        column: &AttributeName,
        tag_filter: Option<&TagSet>,
    ) -> FeatureCollection {
        let rows = FeatureRow::rows_from_collection(document, column);
        self.style(&rows, column, tag_filter)
    }
}

/// Styles `rows` with the default palette.
#[must_use]
pub fn style(
    rows: &[FeatureRow],
    column: &AttributeName,
    tag_filter: Option<&TagSet>,
) -> FeatureCollection {
    Styler::default().style(rows, column, tag_filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::Point(vec![-86.15, 39.76]))
    }

    fn line() -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::LineString(vec![
            vec![-86.15, 39.76],
            vec![-86.10, 39.80],
        ]))
    }

    fn rows(values: &[&str]) -> Vec<FeatureRow> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| FeatureRow::new(format!("feature {i}"), *v, point()))
            .collect()
    }

    fn access() -> AttributeName {
        AttributeName::new("ACCESS").unwrap()
    }

    #[test]
    fn first_occurrence_order_assigns_palette() {
        let styled = style(&rows(&["private", "permissive", "private"]), &access(), None);
        let palette = Palette::default();

        assert_eq!(styled.len(), 3);
        assert_eq!(styled.colors().len(), 2);
        assert_eq!(styled.colors().get("private"), Some(palette.color(0)));
        assert_eq!(styled.colors().get("permissive"), Some(palette.color(1)));
        assert_eq!(styled.features()[2].color(), palette.color(0));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let input = rows(&["yes", "no", "private", "no", "yes"]);
        let a = style(&input, &access(), None);
        let b = style(&input, &access(), None);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.to_geojson()).unwrap(),
            serde_json::to_string(&b.to_geojson()).unwrap()
        );
    }

    #[test]
    fn tag_filter_keeps_matching_rows() {
        let filter: TagSet = std::iter::once("private".to_string()).collect();
        let styled = style(&rows(&["private", "permissive"]), &access(), Some(&filter));

        assert_eq!(styled.len(), 1);
        assert_eq!(styled.features()[0].attribute_value(), "private");
        assert_eq!(styled.features()[0].name(), "feature 0");
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let filter = TagSet::new();
        let styled = style(&rows(&["private", "permissive"]), &access(), Some(&filter));
        assert_eq!(styled.len(), 2);
    }

    #[test]
    fn empty_input_is_empty_collection() {
        let styled = style(&[], &access(), None);
        assert!(styled.is_empty());
        assert!(styled.colors().is_empty());
        assert!(styled.to_geojson().features.is_empty());
    }

    #[test]
    fn points_get_weight_and_lines_do_not() {
        let color = ColorToken::new("red");
        let point_style = FeatureStyle::for_geometry(&point(), &color);
        let line_style = FeatureStyle::for_geometry(&line(), &color);

        assert_eq!(point_style.weight, Some(POINT_WEIGHT));
        assert_eq!(point_style.fill_color, color);
        assert_eq!(line_style.weight, None);
        assert_eq!(
            serde_json::to_value(&line_style).unwrap(),
            serde_json::json!({"color": "red", "fillColor": "red"})
        );
    }

    #[test]
    fn popup_shows_name_and_column() {
        let fields = popup_fields(&access());
        assert_eq!(fields[0].field, "NAME");
        assert_eq!(fields[1].field, "ACCESS");
        assert_eq!(fields[1].label, "ACCESS:");
    }

    #[test]
    fn export_carries_color_and_style() {
        let styled = style(&rows(&["private"]), &access(), None);
        let exported = styled.to_geojson();
        let props = exported.features[0].properties.as_ref().unwrap();

        assert_eq!(props["NAME"], "feature 0");
        assert_eq!(props["ACCESS"], "private");
        assert_eq!(props[COLOR_PROPERTY], DEFAULT_PALETTE[0]);
        assert_eq!(props[STYLE_PROPERTY]["weight"], POINT_WEIGHT);
    }

    #[test]
    fn style_document_skips_incomplete_features() {
        let document: geojson::FeatureCollection = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [0, 0]},
                 "properties": {"NAME": "a", "ACCESS": "private"}},
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [1, 1]},
                 "properties": {"NAME": "b", "ACCESS": null}}
            ]
        }"#
        .parse()
        .unwrap();

        let styled = Styler::default().style_document(&document, &access(), None);
        assert_eq!(styled.len(), 1);
    }
}
