//! Record predicates shared by every backend.

use crate::domain::StateTransition;
use crate::domain::state::{State, reason};

/// Returns `true` if the transition belongs in the state history.
///
/// Unchanged transitions are skipped, as are two administrative
/// Normal to Normal transitions: a series going missing, and a paused or
/// updated rule being reset to plain Normal.
#[must_use]
pub fn should_record(transition: &StateTransition) -> bool {
    if !transition.changed() {
        return false;
    }

    let normal_to_normal =
        transition.previous_state == State::Normal && transition.state.state == State::Normal;
    if !normal_to_normal {
        return true;
    }

    if transition.state.state_reason == reason::MISSING_SERIES {
        return false;
    }

    let administrative_previous = transition.previous_state_reason == reason::PAUSED
        || transition.previous_state_reason == reason::UPDATED;
    !(transition.state.state_reason.is_empty() && administrative_previous)
}

/// Returns `true` if the transition should become an annotation.
///
/// Stricter than [`should_record`]: flapping between Normal and
/// Normal (NoData) is not drawn on panels.
#[must_use]
pub fn should_record_annotation(transition: &StateTransition) -> bool {
    if !should_record(transition) {
        return false;
    }

    if transition.previous_state == State::Normal && transition.state.state == State::Normal {
        let prev = transition.previous_state_reason.as_str();
        let cur = transition.state.state_reason.as_str();
        if (prev.is_empty() && cur == reason::NO_DATA) || (prev == reason::NO_DATA && cur.is_empty())
        {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::domain::{AlertState, Labels};

    const REASONS: [&str; 8] = [
        "",
        reason::MISSING_SERIES,
        reason::PAUSED,
        reason::UPDATED,
        reason::RULE_DELETED,
        reason::NO_DATA,
        reason::ERROR,
        reason::KEEP_LAST,
    ];

    fn transition(prev: State, prev_reason: &str, cur: State, cur_reason: &str) -> StateTransition {
        StateTransition {
            state: AlertState {
                org_id: 1,
                alert_rule_uid: "rule-1".to_string(),
                state: cur,
                state_reason: cur_reason.to_string(),
                labels: Labels::new(),
                values: BTreeMap::new(),
                last_evaluation_time: Utc::now(),
                error: None,
            },
            previous_state: prev,
            previous_state_reason: prev_reason.to_string(),
        }
    }

    fn expected(prev: State, prev_reason: &str, cur: State, cur_reason: &str) -> bool {
        if prev == cur && prev_reason == cur_reason {
            return false;
        }
        if prev == State::Normal && cur == State::Normal {
            if cur_reason == reason::MISSING_SERIES {
                return false;
            }
            if cur_reason.is_empty()
                && (prev_reason == reason::PAUSED || prev_reason == reason::UPDATED)
            {
                return false;
            }
        }
        true
    }

    #[test]
    fn should_record_exhaustive_table() {
        for prev in State::ALL {
            for prev_reason in REASONS {
                for cur in State::ALL {
                    for cur_reason in REASONS {
                        let t = transition(prev, prev_reason, cur, cur_reason);
                        assert_eq!(
                            should_record(&t),
                            expected(prev, prev_reason, cur, cur_reason),
                            "{prev} ({prev_reason}) -> {cur} ({cur_reason})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn documented_exceptions() {
        assert!(!should_record(&transition(
            State::Normal,
            "",
            State::Normal,
            reason::MISSING_SERIES
        )));
        assert!(!should_record(&transition(State::Normal, reason::PAUSED, State::Normal, "")));
        assert!(!should_record(&transition(State::Normal, reason::UPDATED, State::Normal, "")));
        assert!(should_record(&transition(State::Alerting, "", State::Normal, "")));
        assert!(should_record(&transition(
            State::Alerting,
            "",
            State::Normal,
            reason::MISSING_SERIES
        )));
    }

    #[test]
    fn annotation_predicate_skips_nodata_flapping() {
        assert!(!should_record_annotation(&transition(
            State::Normal,
            "",
            State::Normal,
            reason::NO_DATA
        )));
        assert!(!should_record_annotation(&transition(
            State::Normal,
            reason::NO_DATA,
            State::Normal,
            ""
        )));
        assert!(should_record_annotation(&transition(State::Normal, "", State::Alerting, "")));
        assert!(!should_record_annotation(&transition(State::Pending, "", State::Pending, "")));
    }
}
