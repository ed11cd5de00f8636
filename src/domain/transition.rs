//! Alert instance state and state transitions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::labels::Labels;
use super::state::{State, format_state_and_reason};

/// The state of one alert instance after an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    /// Owning organization.
    pub org_id: i64,
    /// UID of the rule that produced this instance.
    pub alert_rule_uid: String,
    /// Evaluation state.
    pub state: State,
    /// Optional reason qualifying the state.
    #[serde(default)]
    pub state_reason: String,
    /// Instance labels.
    #[serde(default)]
    pub labels: Labels,
    /// Numeric values of the evaluated expressions, by RefID.
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
    /// Timestamp of the evaluation that produced this state.
    pub last_evaluation_time: DateTime<Utc>,
    /// Evaluation error message, for [`State::Error`].
    #[serde(default)]
    pub error: Option<String>,
}

impl AlertState {
    /// Expression values as a JSON object.
    ///
    /// JSON has no NaN or infinities; those are stored as the strings
    /// `"NaN"`, `"+Inf"` and `"-Inf"`.
    #[must_use]
    pub fn values_json(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(name, value)| (name.clone(), float_value(*value)))
            .collect()
    }
}

fn float_value(value: f64) -> Value {
    if value.is_nan() {
        Value::String("NaN".to_string())
    } else if value.is_infinite() {
        Value::String(if value > 0.0 { "+Inf" } else { "-Inf" }.to_string())
    } else {
        serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

/// One alert instance's change at one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    /// The new state.
    pub state: AlertState,
    /// State before the evaluation.
    pub previous_state: State,
    /// Reason qualifying the previous state.
    #[serde(default)]
    pub previous_state_reason: String,
}

impl StateTransition {
    /// Returns `true` if the state or its reason changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous_state != self.state.state
            || self.previous_state_reason != self.state.state_reason
    }

    /// The new state rendered with its reason.
    #[must_use]
    pub fn formatted(&self) -> String {
        format_state_and_reason(self.state.state, &self.state.state_reason)
    }

    /// The previous state rendered with its reason.
    #[must_use]
    pub fn previous_formatted(&self) -> String {
        format_state_and_reason(self.previous_state, &self.previous_state_reason)
    }
}
