//! Control panel choices and selection rules.

use osm_explorer_config::{ColumnRegistry, ExplorerConfig, RowCaps};
use osm_explorer_geometry_models::{AttributeName, Filters, GeometryKind};
use osm_explorer_landmark::Locator;
use osm_explorer_query::{QueryExecutionError, QueryReport};
use osm_explorer_store::{GeometryStore, StoreError};

/// Receives notifications the view state machine raises for the user.
pub trait ControlPanel {
    /// A store round trip (or cache hit) completed.
    fn query_report(&mut self, report: &QueryReport);

    /// A query failed; the previous overlay is still displayed.
    fn query_error(&mut self, error: &QueryExecutionError);

    /// A selection change was refused; the previous selections remain.
    fn selection_rejected(&mut self, error: &SelectionError);
}

/// A control panel that records what it was told.
#[derive(Debug, Clone, Default)]
pub struct RecordingPanel {
    /// Query reports, in order.
    pub reports: Vec<QueryReport>,
    /// Query errors, in order.
    pub errors: Vec<QueryExecutionError>,
    /// Refused selections, in order.
    pub rejected: Vec<SelectionError>,
}

impl ControlPanel for RecordingPanel {
    fn query_report(&mut self, report: &QueryReport) {
        self.reports.push(report.clone());
    }

    fn query_error(&mut self, error: &QueryExecutionError) {
        self.errors.push(error.clone());
    }

    fn selection_rejected(&mut self, error: &SelectionError) {
        self.rejected.push(error.clone());
    }
}

/// A selection the control panel does not offer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// The column is not offered for the table.
    #[error("Column {column} is not available for {table}")]
    ColumnNotAllowed {
        /// Selected table.
        table: GeometryKind,
        /// Selected column.
        column: AttributeName,
    },
    /// The row cap is not one of the choices.
    #[error("Row cap {0} is not offered")]
    RowCapNotOffered(u32),
}

/// Everything the control panel lets the user choose from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPanelOptions {
    columns: ColumnRegistry,
    row_caps: RowCaps,
    landmarks: Vec<String>,
    min_tag_count: u64,
}

impl Default for ControlPanelOptions {
    fn default() -> Self {
        Self::from_config(&ExplorerConfig::default(), &Locator::default())
    }
}

impl ControlPanelOptions {
    /// Builds the choices from configuration and the landmark table.
    #[must_use]
    pub fn from_config(config: &ExplorerConfig, locator: &Locator) -> Self {
        Self {
            columns: config.columns.clone(),
            row_caps: config.row_caps.clone(),
            landmarks: locator.choices(),
            min_tag_count: config.min_tag_count,
        }
    }

    /// Replaces the landmark selector entries.
    #[must_use]
    pub fn with_landmarks(mut self, landmarks: Vec<String>) -> Self {
        self.landmarks = landmarks;
        self
    }

    /// Selectable tables.
    #[must_use]
    pub const fn tables(&self) -> &'static [GeometryKind] {
        GeometryKind::all()
    }

    /// Columns offered for `table`.
    #[must_use]
    pub fn columns(&self, table: GeometryKind) -> &[AttributeName] {
        self.columns.for_kind(table)
    }

    /// Row cap choices, in selector order.
    #[must_use]
    pub fn row_caps(&self) -> &[u32] {
        &self.row_caps.choices
    }

    /// Landmark selector entries, "no selection" first.
    #[must_use]
    pub fn landmarks(&self) -> &[String] {
        &self.landmarks
    }

    /// Minimum frequency for a tag choice.
    #[must_use]
    pub const fn min_tag_count(&self) -> u64 {
        self.min_tag_count
    }

    /// Initial selections: points, the first point column, no tags, the
    /// default row cap.
    #[must_use]
    pub fn default_filters(&self) -> Filters {
        Filters {
            table: GeometryKind::Point,
            column: self
                .columns(GeometryKind::Point)
                .first()
                .cloned()
                .unwrap_or_default(),
            tags: None,
            row_cap: self.row_caps.default,
        }
    }

    /// Tag choices for `column` of `table`, most frequent first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot count values.
    pub fn tag_choices(
        &self,
        store: &dyn GeometryStore,
        table: GeometryKind,
        column: &AttributeName,
    ) -> Result<Vec<String>, StoreError> {
        Ok(store
            .attribute_values(table, column, self.min_tag_count)?
            .into_iter()
            .map(|v| v.value)
            .collect())
    }

    /// Checks that `filters` only uses offered choices.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError`] for the first choice that is not offered.
    pub fn validate(&self, filters: &Filters) -> Result<(), SelectionError> {
        if !self.columns.allows(filters.table, &filters.column) {
            return Err(SelectionError::ColumnNotAllowed {
                table: filters.table,
                column: filters.column.clone(),
            });
        }
        if !self.row_caps.choices.contains(&filters.row_cap) {
            return Err(SelectionError::RowCapNotOffered(filters.row_cap));
        }
        Ok(())
    }

    /// Applies a selection change.
    ///
    /// When the table changes to one that does not offer the selected
    /// column, the column falls back to the table's first column and the
    /// tag selection is dropped.
    #[must_use]
    pub fn reconcile(&self, previous: &Filters, next: Filters) -> Filters {
        let mut next = next.normalized();
        if next.table != previous.table
            && !self.columns.allows(next.table, &next.column)
            && let Some(first) = self.columns(next.table).first()
        {
            log::debug!(
                "{} is not offered for {}; falling back to {first}",
                next.column,
                next.table
            );
            next.column = first.clone();
            next.tags = None;
        }
        next
    }
}
