//! Snapshot of the alert rule that produced a batch of transitions.

use serde::{Deserialize, Serialize};

use super::labels::Labels;

/// Rule annotation naming the dashboard a rule is attached to.
pub const DASHBOARD_UID_ANNOTATION: &str = "__dashboardUid__";
/// Rule annotation naming the panel a rule is attached to.
pub const PANEL_ID_ANNOTATION: &str = "__panelId__";

/// An alert rule as returned by the rule store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Numeric rule ID.
    pub id: i64,
    /// Owning organization.
    pub org_id: i64,
    /// Rule UID.
    pub uid: String,
    /// Human readable title.
    pub title: String,
    /// Folder UID the rule lives in.
    pub namespace_uid: String,
    /// Evaluation group name.
    pub rule_group: String,
    /// RefID of the condition expression.
    pub condition: String,
    /// Rule annotations, including the dashboard/panel link if any.
    #[serde(default)]
    pub annotations: Labels,
}

/// Immutable description of the rule behind a batch of transitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleMeta {
    /// Numeric rule ID.
    pub id: i64,
    /// Owning organization.
    pub org_id: i64,
    /// Rule UID.
    pub uid: String,
    /// Human readable title.
    pub title: String,
    /// Evaluation group name.
    pub group: String,
    /// Folder UID the rule lives in.
    pub namespace_uid: String,
    /// Linked dashboard UID, if the rule is attached to a panel.
    #[serde(default)]
    pub dashboard_uid: Option<String>,
    /// Linked panel ID, if the rule is attached to a panel.
    #[serde(default)]
    pub panel_id: Option<i64>,
    /// RefID of the condition expression.
    pub condition: String,
}

impl RuleMeta {
    /// Derives the metadata from a stored rule.
    ///
    /// A panel ID annotation that does not parse as an integer is ignored
    /// and logged.
    #[must_use]
    pub fn from_rule(rule: &AlertRule) -> Self {
        let dashboard_uid = rule
            .annotations
            .get(DASHBOARD_UID_ANNOTATION)
            .filter(|uid| !uid.is_empty())
            .cloned();
        let panel_id = rule
            .annotations
            .get(PANEL_ID_ANNOTATION)
            .and_then(|raw| match raw.parse::<i64>() {
                Ok(id) => Some(id),
                Err(err) => {
                    tracing::warn!(rule_uid = %rule.uid, panel_id = %raw, error = %err, "ignoring unparsable panel ID annotation");
                    None
                }
            });
        Self {
            id: rule.id,
            org_id: rule.org_id,
            uid: rule.uid.clone(),
            title: rule.title.clone(),
            group: rule.rule_group.clone(),
            namespace_uid: rule.namespace_uid.clone(),
            dashboard_uid,
            panel_id,
            condition: rule.condition.clone(),
        }
    }

    /// Returns the panel this rule is attached to, if it carries both a
    /// dashboard UID and a panel ID.
    #[must_use]
    pub fn panel_key(&self) -> Option<PanelKey> {
        match (&self.dashboard_uid, self.panel_id) {
            (Some(dashboard_uid), Some(panel_id)) => Some(PanelKey {
                org_id: self.org_id,
                dashboard_uid: dashboard_uid.clone(),
                panel_id,
            }),
            _ => None,
        }
    }
}

/// Identifies a dashboard panel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PanelKey {
    /// Owning organization.
    pub org_id: i64,
    /// Dashboard UID.
    pub dashboard_uid: String,
    /// Panel ID within the dashboard.
    pub panel_id: i64,
}
