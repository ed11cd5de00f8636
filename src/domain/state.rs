//! Alert evaluation states and state reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Evaluation state of an alert instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum State {
    /// The condition is not met.
    #[default]
    Normal,
    /// The condition is met and the pending period has elapsed.
    Alerting,
    /// The condition is met but the pending period has not elapsed yet.
    Pending,
    /// The query returned no data.
    NoData,
    /// The evaluation failed.
    Error,
    /// The condition stopped being met; waiting out the keep-firing period.
    Recovering,
}

impl State {
    /// Every state, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Normal,
        Self::Alerting,
        Self::Pending,
        Self::NoData,
        Self::Error,
        Self::Recovering,
    ];

    /// Returns the canonical name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Alerting => "Alerting",
            Self::Pending => "Pending",
            Self::NoData => "NoData",
            Self::Error => "Error",
            Self::Recovering => "Recovering",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known state reasons attached to transitions.
pub mod reason {
    /// The series disappeared from the evaluation results.
    pub const MISSING_SERIES: &str = "MissingSeries";
    /// The rule was paused.
    pub const PAUSED: &str = "Paused";
    /// The rule definition was updated.
    pub const UPDATED: &str = "Updated";
    /// The rule was deleted.
    pub const RULE_DELETED: &str = "RuleDeleted";
    /// The state was mapped from a NoData evaluation.
    pub const NO_DATA: &str = "NoData";
    /// The state was mapped from an Error evaluation.
    pub const ERROR: &str = "Error";
    /// The previous state was kept for NoData/Error evaluations.
    pub const KEEP_LAST: &str = "KeepLast";
}

/// Renders a state with its optional reason, e.g. `"Alerting"` or
/// `"Normal (MissingSeries)"`.
#[must_use]
pub fn format_state_and_reason(state: State, reason: &str) -> String {
    if reason.is_empty() {
        state.to_string()
    } else {
        format!("{state} ({reason})")
    }
}
