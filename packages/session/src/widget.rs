//! Map widget contract.

use std::sync::Arc;

use osm_explorer_geometry_models::LatLng;
use osm_explorer_style::{FeatureCollection, PopupField};

/// A styled overlay ready to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    collection: Arc<FeatureCollection>,
    popup_fields: Vec<PopupField>,
}

impl Overlay {
    /// Wraps a styled collection.
    #[must_use]
    pub fn new(collection: Arc<FeatureCollection>) -> Self {
        let popup_fields = collection.popup_fields();
        Self {
            collection,
            popup_fields,
        }
    }

    /// The styled features; each carries its own style.
    #[must_use]
    pub fn collection(&self) -> &FeatureCollection {
        &self.collection
    }

    /// Fields shown in a feature's popup.
    #[must_use]
    pub fn popup_fields(&self) -> &[PopupField] {
        &self.popup_fields
    }
}

/// An interactive map the driver pushes view and overlay changes to.
pub trait MapWidget {
    /// Moves the map.
    fn set_view(&mut self, center: LatLng, zoom: u8);

    /// Replaces the overlay. Never called with an empty collection.
    fn render(&mut self, overlay: &Overlay);

    /// Removes the overlay.
    fn clear_overlay(&mut self);
}

/// One call made on a [`RecordingWidget`].
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetCall {
    /// `set_view(center, zoom)`.
    SetView {
        /// New center.
        center: LatLng,
        /// New zoom.
        zoom: u8,
    },
    /// `render(overlay)`.
    Render(Overlay),
    /// `clear_overlay()`.
    ClearOverlay,
}

/// A map widget that records calls and keeps the current overlay.
#[derive(Debug, Clone, Default)]
pub struct RecordingWidget {
    /// Every call, in order.
    pub calls: Vec<WidgetCall>,
    /// The overlay currently shown.
    pub overlay: Option<Overlay>,
    /// The view last set.
    pub view: Option<(LatLng, u8)>,
}

impl RecordingWidget {
    /// Number of `render` calls so far.
    #[must_use]
    pub fn render_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, WidgetCall::Render(_)))
            .count()
    }
}

impl MapWidget for RecordingWidget {
    fn set_view(&mut self, center: LatLng, zoom: u8) {
        self.view = Some((center, zoom));
        self.calls.push(WidgetCall::SetView { center, zoom });
    }

    fn render(&mut self, overlay: &Overlay) {
        self.overlay = Some(overlay.clone());
        self.calls.push(WidgetCall::Render(overlay.clone()));
    }

    fn clear_overlay(&mut self) {
        self.overlay = None;
        self.calls.push(WidgetCall::ClearOverlay);
    }
}
