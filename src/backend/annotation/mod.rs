//! State history stored as annotations.
//!
//! Each recordable transition becomes one [`AnnotationItem`] whose text
//! summarizes the instance and its values. Rules attached to a panel get
//! their annotations linked to that dashboard panel.

pub mod resolver;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use super::predicate::should_record_annotation;
use super::record::spawn_write;
use super::{Backend, RecordHandle};
use crate::access::RuleStore;
use crate::domain::labels::{labels_to_string, remove_private_labels};
use crate::domain::{Field, FieldValues, Frame, HistoryQuery, RuleMeta, State, StateTransition};
use crate::error::HistorianError;
use crate::metrics::HistorianMetrics;

pub use self::resolver::{DashboardResolver, DashboardStore};
pub use self::store::{AnnotationItem, AnnotationQuery, AnnotationRepository, AnnotationStore};

const BACKEND_NAME: &str = "annotations";
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// [`Backend`] writing transitions as annotations.
#[derive(Debug)]
pub struct AnnotationBackend {
    store: Arc<AnnotationStore>,
    rules: Arc<dyn RuleStore>,
    metrics: Arc<HistorianMetrics>,
    write_timeout: Duration,
}

impl AnnotationBackend {
    /// Creates the backend.
    #[must_use]
    pub fn new(
        store: Arc<AnnotationStore>,
        rules: Arc<dyn RuleStore>,
        metrics: Arc<HistorianMetrics>,
    ) -> Self {
        Self {
            store,
            rules,
            metrics,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Sets the timeout of one detached save.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

#[async_trait]
impl Backend for AnnotationBackend {
    fn record(&self, rule: &RuleMeta, transitions: &[StateTransition]) -> RecordHandle {
        let items = build_annotations(rule, transitions);
        if items.is_empty() {
            return RecordHandle::done();
        }

        let store = Arc::clone(&self.store);
        let panel = rule.panel_key();
        let org_id = rule.org_id;
        let count = items.len();
        spawn_write(&self.metrics, BACKEND_NAME, org_id, count, self.write_timeout, async move {
            store.save(panel.as_ref(), items, org_id).await
        })
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Frame, HistorianError> {
        let Some(rule_uid) = &query.rule_uid else {
            return Err(HistorianError::InvalidQuery(
                "ruleUID is required to query annotations".to_string(),
            ));
        };
        if !query.labels.is_empty() {
            tracing::warn!("annotation state history backend does not support label filters, ignoring them");
        }

        let rule = self
            .rules
            .get_alert_rule_by_uid(query.org_id, rule_uid)
            .await?;
        let (from, to) = query.time_range(Utc::now());
        let items = self
            .store
            .find(&AnnotationQuery {
                org_id: query.org_id,
                alert_id: rule.id,
                from: from.timestamp_millis(),
                to: to.timestamp_millis(),
                limit: query.limit,
            })
            .await?;
        history_frame(&items)
    }
}

/// Builds the annotations of the recordable transitions.
#[must_use]
pub fn build_annotations(rule: &RuleMeta, transitions: &[StateTransition]) -> Vec<AnnotationItem> {
    transitions
        .iter()
        .filter(|t| should_record_annotation(t))
        .map(|transition| {
            let (text, data) = annotation_text_and_data(rule, transition);
            AnnotationItem {
                org_id: transition.state.org_id,
                alert_id: rule.id,
                epoch: transition.state.last_evaluation_time.timestamp_millis(),
                text,
                prev_state: transition.previous_formatted(),
                new_state: transition.formatted(),
                data,
                ..AnnotationItem::default()
            }
        })
        .collect()
}

/// Renders `"<title> {<labels>} - <values>"` and the matching data document.
#[must_use]
pub fn annotation_text_and_data(rule: &RuleMeta, transition: &StateTransition) -> (String, Value) {
    let state = &transition.state;
    let mut data = Map::new();
    let value = match state.state {
        State::Error => {
            data.insert(
                "error".to_string(),
                state.error.clone().map_or(Value::Null, Value::String),
            );
            "Error".to_string()
        }
        State::NoData => {
            data.insert("noData".to_string(), Value::Bool(true));
            "No data".to_string()
        }
        _ => {
            data.insert("values".to_string(), Value::Object(state.values_json()));
            state
                .values
                .iter()
                .map(|(name, value)| format!("{name}={value:.6}"))
                .collect::<Vec<_>>()
                .join(", ")
        }
    };
    let labels = labels_to_string(&remove_private_labels(&state.labels));
    (
        format!("{} {{{labels}}} - {value}", rule.title),
        Value::Object(data),
    )
}

/// Turns annotations into a `states` frame with `time`, `text`, `prev`,
/// `next` and `data` columns.
fn history_frame(items: &[AnnotationItem]) -> Result<Frame, HistorianError> {
    let mut times = Vec::with_capacity(items.len());
    let mut texts = Vec::with_capacity(items.len());
    let mut prev = Vec::with_capacity(items.len());
    let mut next = Vec::with_capacity(items.len());
    let mut data: Vec<Box<RawValue>> = Vec::with_capacity(items.len());
    for item in items {
        times.push(DateTime::from_timestamp_millis(item.epoch).unwrap_or_default());
        texts.push(item.text.clone());
        prev.push(item.prev_state.clone());
        next.push(item.new_state.clone());
        data.push(serde_json::value::to_raw_value(&item.data)?);
    }
    Ok(Frame::new(
        "states",
        vec![
            Field::new("time", FieldValues::Time(times)),
            Field::new("text", FieldValues::String(texts)),
            Field::new("prev", FieldValues::String(prev)),
            Field::new("next", FieldValues::String(next)),
            Field::new("data", FieldValues::Json(data)),
        ],
    ))
}
