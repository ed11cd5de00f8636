//! History read requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::labels::Labels;

/// Lookback window, in hours, applied when a query has no lower time bound.
pub const DEFAULT_QUERY_RANGE_HOURS: i64 = 6;

/// The identity on whose behalf history is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Numeric user ID.
    pub user_id: i64,
    /// Organization the identity is acting in.
    pub org_id: i64,
    /// Login name, for logs.
    pub login: String,
}

/// A request for the state history of one organization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Organization to read.
    pub org_id: i64,
    /// Only transitions of this rule.
    #[serde(default)]
    pub rule_uid: Option<String>,
    /// Only transitions of rules attached to this dashboard.
    #[serde(default)]
    pub dashboard_uid: Option<String>,
    /// Only transitions of rules attached to this panel.
    #[serde(default)]
    pub panel_id: Option<i64>,
    /// Prefix the formatted previous state must start with.
    #[serde(default)]
    pub previous: Option<String>,
    /// Prefix the formatted current state must start with.
    #[serde(default)]
    pub current: Option<String>,
    /// Exact-match instance label filters.
    #[serde(default)]
    pub labels: Labels,
    /// Lower time bound; defaults to [`DEFAULT_QUERY_RANGE_HOURS`] before now.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Upper time bound; defaults to now.
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of entries per backend request; 0 means backend default.
    #[serde(default)]
    pub limit: usize,
    /// Requesting identity, used for folder scoping.
    #[serde(default)]
    pub identity: Option<Identity>,
}

impl HistoryQuery {
    /// Resolves the effective `(from, to)` range relative to `now`.
    ///
    /// A missing `to` becomes `now`; a missing `from` becomes
    /// [`DEFAULT_QUERY_RANGE_HOURS`] before `now`. Inverted bounds are swapped.
    #[must_use]
    pub fn time_range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let to = self.to.unwrap_or(now);
        let from = self.from.unwrap_or(now - Duration::hours(DEFAULT_QUERY_RANGE_HOURS));
        if from > to { (to, from) } else { (from, to) }
    }

    /// Returns `true` if the query filters on fields of the log line body.
    #[must_use]
    pub fn has_line_filters(&self) -> bool {
        self.rule_uid.is_some()
            || self.dashboard_uid.is_some()
            || self.panel_id.is_some()
            || self.previous.is_some()
            || self.current.is_some()
            || !self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0)
            .single()
            .unwrap_or_default()
    }

    #[test]
    fn defaults_to_six_hour_window_ending_now() {
        let now = at(12);
        let (from, to) = HistoryQuery::default().time_range(now);
        assert_eq!(to, now);
        assert_eq!(from, at(6));
    }

    #[test]
    fn swaps_inverted_bounds() {
        let query = HistoryQuery {
            from: Some(at(10)),
            to: Some(at(8)),
            ..HistoryQuery::default()
        };
        assert_eq!(query.time_range(at(12)), (at(8), at(10)));
    }

    #[test]
    fn keeps_explicit_bounds() {
        let query = HistoryQuery {
            from: Some(at(1)),
            to: Some(at(2)),
            ..HistoryQuery::default()
        };
        assert_eq!(query.time_range(at(12)), (at(1), at(2)));
    }

    #[test]
    fn line_filters_detected() {
        assert!(!HistoryQuery::default().has_line_filters());
        let query = HistoryQuery {
            panel_id: Some(3),
            ..HistoryQuery::default()
        };
        assert!(query.has_line_filters());
    }
}
