//! Encoding of state transitions into Loki log lines.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::client::{Sample, Stream};
use crate::backend::predicate::should_record;
use crate::domain::labels::{fingerprint, remove_private_labels};
use crate::domain::state::State;
use crate::domain::{AlertState, Labels, RuleMeta, StateTransition};

/// Version of the [`LokiEntry`] layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Stream label marking state history lines.
pub const STATE_HISTORY_LABEL_KEY: &str = "from";
/// Value of [`STATE_HISTORY_LABEL_KEY`].
pub const STATE_HISTORY_LABEL_VALUE: &str = "state-history";
/// Stream label carrying the organization ID.
pub const ORG_ID_LABEL: &str = "orgID";
/// Stream label carrying the rule group.
pub const GROUP_LABEL: &str = "group";
/// Stream label carrying the rule's folder UID.
pub const FOLDER_UID_LABEL: &str = "folderUID";

/// One state transition as stored in a Loki line.
///
/// Instance labels are stored under `labels` so that LogQL's `json` parser
/// exposes them as `labels_<name>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LokiEntry {
    /// Layout version, see [`SCHEMA_VERSION`].
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// Previous state and reason, formatted.
    pub previous: String,
    /// New state and reason, formatted.
    pub current: String,
    /// Evaluation error, only for the Error state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Expression values by RefID; empty for Error and NoData.
    #[serde(default)]
    pub values: Map<String, Value>,
    /// RefID of the rule condition.
    pub condition: String,
    /// Linked dashboard UID, empty if none.
    #[serde(rename = "dashboardUID")]
    pub dashboard_uid: String,
    /// Linked panel ID, 0 if none.
    #[serde(rename = "panelID")]
    pub panel_id: i64,
    /// Fingerprint of the instance labels.
    pub fingerprint: String,
    /// Rule title.
    #[serde(rename = "ruleTitle")]
    pub rule_title: String,
    /// Numeric rule ID.
    #[serde(rename = "ruleID")]
    pub rule_id: i64,
    /// Rule UID.
    #[serde(rename = "ruleUID")]
    pub rule_uid: String,
    /// Instance labels without private labels.
    #[serde(rename = "labels", alias = "instanceLabels", default)]
    pub instance_labels: Labels,
}

impl LokiEntry {
    /// Builds the entry for one transition.
    #[must_use]
    pub fn new(rule: &RuleMeta, transition: &StateTransition) -> Self {
        let instance_labels = remove_private_labels(&transition.state.labels);
        let error = match transition.state.state {
            State::Error => Some(transition.state.error.clone().unwrap_or_default()),
            _ => None,
        };
        Self {
            schema_version: SCHEMA_VERSION,
            previous: transition.previous_formatted(),
            current: transition.formatted(),
            error,
            values: values_document(&transition.state),
            condition: rule.condition.clone(),
            dashboard_uid: rule.dashboard_uid.clone().unwrap_or_default(),
            panel_id: rule.panel_id.unwrap_or_default(),
            fingerprint: fingerprint(&instance_labels),
            rule_title: rule.title.clone(),
            rule_id: rule.id,
            rule_uid: rule.uid.clone(),
            instance_labels,
        }
    }
}

/// Builds the stream label set: external labels overlaid by system labels.
#[must_use]
pub fn stream_labels(rule: &RuleMeta, external_labels: &Labels) -> Labels {
    let mut labels = external_labels.clone();
    labels.insert(
        STATE_HISTORY_LABEL_KEY.to_string(),
        STATE_HISTORY_LABEL_VALUE.to_string(),
    );
    labels.insert(ORG_ID_LABEL.to_string(), rule.org_id.to_string());
    labels.insert(GROUP_LABEL.to_string(), rule.group.clone());
    labels.insert(FOLDER_UID_LABEL.to_string(), rule.namespace_uid.clone());
    labels
}

/// Encodes the recordable transitions of one rule into a single stream.
///
/// Transitions rejected by [`should_record`] are dropped; the stream may
/// end up with no samples.
#[must_use]
pub fn transitions_to_stream(
    rule: &RuleMeta,
    transitions: &[StateTransition],
    external_labels: &Labels,
) -> Stream {
    let mut values = Vec::with_capacity(transitions.len());
    for transition in transitions.iter().filter(|t| should_record(t)) {
        let entry = LokiEntry::new(rule, transition);
        match serde_json::to_string(&entry) {
            Ok(line) => values.push(Sample {
                t: transition.state.last_evaluation_time,
                v: line,
            }),
            Err(err) => {
                tracing::error!(rule_uid = %rule.uid, error = %err, "failed to encode state history entry, skipping");
            }
        }
    }
    Stream {
        stream: stream_labels(rule, external_labels),
        values,
    }
}

fn values_document(state: &AlertState) -> Map<String, Value> {
    if matches!(state.state, State::Error | State::NoData) {
        return Map::new();
    }
    state.values_json()
}
