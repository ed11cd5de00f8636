//! Database rows for annotations and dashboards.

use serde::{Deserialize, Serialize};

use crate::backend::annotation::AnnotationItem;

/// Columns of the `annotation` table in [`ANNOTATION_COLUMNS`] order.
pub type AnnotationRow = (
    i64,
    i64,
    i64,
    Option<String>,
    i64,
    i64,
    i64,
    i64,
    String,
    String,
    String,
    serde_json::Value,
);

/// Column list matching [`AnnotationRow`].
pub const ANNOTATION_COLUMNS: &str = "id, org_id, alert_id, dashboard_uid, dashboard_id, panel_id, \
     epoch, epoch_end, text, prev_state, new_state, data";

/// Maps a selected row to an item.
#[must_use]
pub fn item_from_row(row: AnnotationRow) -> AnnotationItem {
    let (
        id,
        org_id,
        alert_id,
        dashboard_uid,
        dashboard_id,
        panel_id,
        epoch,
        epoch_end,
        text,
        prev_state,
        new_state,
        data,
    ) = row;
    AnnotationItem {
        id,
        org_id,
        alert_id,
        dashboard_uid,
        dashboard_id,
        panel_id,
        epoch,
        epoch_end,
        text,
        prev_state,
        new_state,
        data,
    }
}

/// A row of the `dashboard` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDashboard {
    /// Auto-increment row ID.
    pub id: i64,
    /// Owning organization.
    pub org_id: i64,
    /// Dashboard UID.
    pub uid: String,
    /// Dashboard title.
    pub title: String,
}
