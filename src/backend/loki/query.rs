//! LogQL construction for history queries.
//!
//! A query is `head + folder clause + "}" + tail`:
//!
//! ```text
//! {orgID="1",from="state-history",folderUID=~"a|b"} | json | ruleUID="x" | labels_env="prod"
//! '-------------- head ----------''--- folders ---'  '------------- tail ---------------'
//! ```
//!
//! When folder UIDs do not fit into one query they are spread over several
//! queries, each within the maximum size.

use super::entry::{FOLDER_UID_LABEL, ORG_ID_LABEL, STATE_HISTORY_LABEL_KEY, STATE_HISTORY_LABEL_VALUE};
use crate::domain::HistoryQuery;
use crate::domain::labels::sanitize_label_name;
use crate::error::HistorianError;

const FOLDER_CLAUSE_OPEN: &str = ",folderUID=~\"";
const FOLDER_CLAUSE_CLOSE: &str = "\"";
const SELECTOR_CLOSE: &str = "}";
const FOLDER_SEPARATOR: &str = "|";

/// Builds the LogQL queries answering `query`.
///
/// `folder_uids` of `None` means no folder restriction. Otherwise the
/// folders are sorted, deduplicated and packed greedily into as few queries
/// as the size limit allows.
///
/// # Errors
///
/// Returns [`HistorianError::QueryTooLong`] if the query without folders,
/// or with any single folder, exceeds `max_query_size`.
pub fn build_log_queries(
    query: &HistoryQuery,
    folder_uids: Option<&[String]>,
    max_query_size: usize,
) -> Result<Vec<String>, HistorianError> {
    let head = head(query);
    let tail = tail(query);

    let base = format!("{head}{SELECTOR_CLOSE}{tail}");
    if base.len() > max_query_size {
        return Err(HistorianError::QueryTooLong {
            size: base.len(),
            max: max_query_size,
            query: base,
        });
    }

    let Some(folder_uids) = folder_uids.filter(|uids| !uids.is_empty()) else {
        return Ok(vec![base]);
    };

    let mut sorted = folder_uids.to_vec();
    sorted.sort();
    sorted.dedup();
    let escaped = sorted
        .iter()
        .map(|uid| escape_string(&regex::escape(uid)))
        .collect::<Vec<_>>();

    let fixed = base.len() + FOLDER_CLAUSE_OPEN.len() + FOLDER_CLAUSE_CLOSE.len();
    let assemble = |batch: &[String]| {
        format!(
            "{head}{FOLDER_CLAUSE_OPEN}{}{FOLDER_CLAUSE_CLOSE}{SELECTOR_CLOSE}{tail}",
            batch.join(FOLDER_SEPARATOR)
        )
    };

    let mut queries = Vec::new();
    let mut batch: Vec<String> = Vec::new();
    let mut batch_len = 0;
    for uid in escaped {
        if fixed + uid.len() > max_query_size {
            let query = assemble(std::slice::from_ref(&uid));
            return Err(HistorianError::QueryTooLong {
                size: query.len(),
                max: max_query_size,
                query,
            });
        }

        let separator = if batch.is_empty() { 0 } else { FOLDER_SEPARATOR.len() };
        if fixed + batch_len + separator + uid.len() > max_query_size {
            queries.push(assemble(&batch));
            batch.clear();
            batch_len = 0;
        }

        batch_len += if batch.is_empty() { 0 } else { FOLDER_SEPARATOR.len() } + uid.len();
        batch.push(uid);
    }
    if !batch.is_empty() {
        queries.push(assemble(&batch));
    }

    Ok(queries)
}

/// The stream selector without its closing brace.
fn head(query: &HistoryQuery) -> String {
    format!(
        "{{{ORG_ID_LABEL}=\"{}\",{STATE_HISTORY_LABEL_KEY}=\"{STATE_HISTORY_LABEL_VALUE}\"",
        query.org_id
    )
}

/// Line filters on fields of the JSON body.
fn tail(query: &HistoryQuery) -> String {
    if !query.has_line_filters() {
        return String::new();
    }

    let mut tail = String::from(" | json");
    if let Some(rule_uid) = &query.rule_uid {
        tail.push_str(&format!(" | ruleUID={}", quote(rule_uid)));
    }
    if let Some(dashboard_uid) = &query.dashboard_uid {
        tail.push_str(&format!(" | dashboardUID={}", quote(dashboard_uid)));
    }
    if let Some(panel_id) = query.panel_id {
        tail.push_str(&format!(" | panelID={panel_id}"));
    }
    if let Some(previous) = &query.previous {
        tail.push_str(&format!(" | previous=~{}", quote(&prefix_pattern(previous))));
    }
    if let Some(current) = &query.current {
        tail.push_str(&format!(" | current=~{}", quote(&prefix_pattern(current))));
    }
    // BTreeMap iteration keeps label filters sorted by key.
    for (name, value) in &query.labels {
        tail.push_str(&format!(
            " | labels_{}={}",
            sanitize_label_name(name),
            quote(value)
        ));
    }
    tail
}

fn prefix_pattern(prefix: &str) -> String {
    format!("^{}.*", regex::escape(prefix))
}

/// Wraps a value in double quotes, escaping it for a LogQL string literal.
fn quote(value: &str) -> String {
    format!("\"{}\"", escape_string(value))
}

fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::domain::Labels;

    const MAX: usize = 65536;

    fn query(org_id: i64) -> HistoryQuery {
        HistoryQuery {
            org_id,
            ..HistoryQuery::default()
        }
    }

    #[test]
    fn plain_selector_without_filters() {
        let Ok(queries) = build_log_queries(&query(1), None, MAX) else {
            panic!("query should build");
        };
        assert_eq!(queries, vec![r#"{orgID="1",from="state-history"}"#.to_string()]);
    }

    #[test]
    fn tail_filters_in_fixed_order() {
        let mut labels = Labels::new();
        labels.insert("zone".to_string(), "b".to_string());
        labels.insert("env".to_string(), "prod".to_string());
        let q = HistoryQuery {
            org_id: 1,
            rule_uid: Some("rule-1".to_string()),
            dashboard_uid: Some("dash-1".to_string()),
            panel_id: Some(42),
            previous: Some("Normal".to_string()),
            current: Some("Alerting (NoData)".to_string()),
            labels,
            ..HistoryQuery::default()
        };
        let Ok(queries) = build_log_queries(&q, None, MAX) else {
            panic!("query should build");
        };
        assert_eq!(
            queries,
            vec![
                r#"{orgID="1",from="state-history"} | json | ruleUID="rule-1" | dashboardUID="dash-1" | panelID=42 | previous=~"^Normal.*" | current=~"^Alerting \\(NoData\\).*" | labels_env="prod" | labels_zone="b""#
                    .to_string()
            ]
        );
    }

    #[test]
    fn folders_go_into_one_sorted_clause() {
        let folders = vec!["b".to_string(), "a".to_string(), "a".to_string()];
        let Ok(queries) = build_log_queries(&query(1), Some(folders.as_slice()), MAX) else {
            panic!("query should build");
        };
        assert_eq!(
            queries,
            vec![r#"{orgID="1",from="state-history",folderUID=~"a|b"}"#.to_string()]
        );
    }

    #[test]
    fn folder_uids_are_regex_escaped() {
        let folders = vec!["a.b".to_string()];
        let Ok(queries) = build_log_queries(&query(1), Some(folders.as_slice()), MAX) else {
            panic!("query should build");
        };
        assert_eq!(
            queries,
            vec![r#"{orgID="1",from="state-history",folderUID=~"a\\.b"}"#.to_string()]
        );
    }

    #[test]
    fn empty_folder_list_means_no_clause() {
        let Ok(queries) = build_log_queries(&query(1), Some(&[][..]), MAX) else {
            panic!("query should build");
        };
        assert_eq!(queries.len(), 1);
        assert!(!queries.iter().any(|q| q.contains(FOLDER_UID_LABEL)));
    }

    #[test]
    fn splits_folders_into_batches() {
        let base_len = r#"{orgID="1",from="state-history"}"#.len();
        let clause = FOLDER_CLAUSE_OPEN.len() + FOLDER_CLAUSE_CLOSE.len();
        // Room for exactly two 3-char UIDs and a separator.
        let max = base_len + clause + 7;
        let folders = ["aaa", "bbb", "ccc", "ddd", "eee"]
            .iter()
            .map(|s| (*s).to_string())
            .collect::<Vec<_>>();
        let Ok(queries) = build_log_queries(&query(1), Some(folders.as_slice()), max) else {
            panic!("query should build");
        };
        assert_eq!(
            queries,
            vec![
                r#"{orgID="1",from="state-history",folderUID=~"aaa|bbb"}"#.to_string(),
                r#"{orgID="1",from="state-history",folderUID=~"ccc|ddd"}"#.to_string(),
                r#"{orgID="1",from="state-history",folderUID=~"eee"}"#.to_string(),
            ]
        );
        assert!(queries.iter().all(|q| q.len() <= max));
    }

    #[test]
    fn base_query_too_long() {
        let q = HistoryQuery {
            org_id: 1,
            rule_uid: Some("x".repeat(100)),
            ..HistoryQuery::default()
        };
        let Err(HistorianError::QueryTooLong { size, max, query }) =
            build_log_queries(&q, None, 50)
        else {
            panic!("expected query too long");
        };
        assert_eq!(max, 50);
        assert_eq!(size, query.len());
        assert!(size > 50);
    }

    #[test]
    fn single_oversized_folder_fails() {
        let base_len = r#"{orgID="1",from="state-history"}"#.len();
        let max = base_len + FOLDER_CLAUSE_OPEN.len() + FOLDER_CLAUSE_CLOSE.len() + 5;
        let folders = vec!["ok".to_string(), "waytoolongfolder".to_string()];
        let Err(HistorianError::QueryTooLong { query, .. }) =
            build_log_queries(&query(1), Some(folders.as_slice()), max)
        else {
            panic!("expected query too long");
        };
        assert!(query.contains("waytoolongfolder"));
    }

    proptest! {
        #[test]
        fn every_batch_fits_and_every_folder_is_covered(
            folders in prop::collection::vec("[a-zA-Z0-9._-]{1,12}", 0..60),
            slack in 0usize..80,
        ) {
            let q = query(12);
            let base_len = r#"{orgID="12",from="state-history"}"#.len();
            let max = base_len + FOLDER_CLAUSE_OPEN.len() + FOLDER_CLAUSE_CLOSE.len() + 36 + slack;
            let Ok(queries) = build_log_queries(&q, Some(folders.as_slice()), max) else {
                // 12 chars escape to at most 36, so every folder fits alone.
                return Err(TestCaseError::fail("build failed"));
            };
            for built in &queries {
                prop_assert!(built.len() <= max);
            }
            let mut unique = folders.clone();
            unique.sort();
            unique.dedup();
            let covered = queries
                .iter()
                .map(|built| built.matches(FOLDER_SEPARATOR).count() + usize::from(built.contains(FOLDER_UID_LABEL)))
                .sum::<usize>();
            prop_assert_eq!(covered, unique.len());
        }
    }
}
