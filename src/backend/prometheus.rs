//! State history written as Prometheus series.
//!
//! Each firing-like state of an alert instance is a series of the
//! configured metric with value `1`. When an instance leaves such a state
//! the old series is closed with a stale marker. Normal never emits.
//!
//! The backend is write only; reads fail with [`HistorianError::NotSupported`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::record::spawn_write;
use super::{Backend, RecordHandle};
use crate::config::PrometheusConfig;
use crate::domain::labels::sanitize_labels;
use crate::domain::{Field, FieldValues, Frame, HistoryQuery, Labels, RuleMeta, State, StateTransition};
use crate::error::HistorianError;
use crate::metrics::HistorianMetrics;

const BACKEND_NAME: &str = "prometheus";
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bit pattern Prometheus uses to mark a series as stale.
pub const STALE_NAN_BITS: u64 = 0x7ff0_0000_0000_0002;

/// Prometheus-style state label: `firing` or `pending`.
pub const ALERT_STATE_LABEL: &str = "alertstate";
/// Fine-grained state label, the lowercase state name.
pub const GRAFANA_ALERT_STATE_LABEL: &str = "grafana_alertstate";
/// Rule UID label.
pub const RULE_UID_LABEL: &str = "grafana_rule_uid";
/// Rule title label.
pub const ALERT_NAME_LABEL: &str = "alertname";

/// Name of the time column in written frames.
pub const TIME_FIELD: &str = "time";

/// Returns the stale marker value.
#[must_use]
pub fn stale_nan() -> f64 {
    f64::from_bits(STALE_NAN_BITS)
}

/// Returns `true` if `value` is the stale marker, not just any NaN.
#[must_use]
pub fn is_stale_nan(value: f64) -> bool {
    value.to_bits() == STALE_NAN_BITS
}

/// Remote-write sink for frames of samples.
#[async_trait]
pub trait SeriesWriter: Send + Sync + fmt::Debug {
    /// Writes `frames` as `metric_name` to the datasource `datasource_uid`.
    ///
    /// `extra_labels` are added to every series.
    ///
    /// # Errors
    ///
    /// Returns an error if the datasource rejects or cannot receive the write.
    async fn write_datasource(
        &self,
        datasource_uid: &str,
        metric_name: &str,
        now: DateTime<Utc>,
        frames: Vec<Frame>,
        org_id: i64,
        extra_labels: &Labels,
    ) -> Result<(), HistorianError>;
}

/// States that produce a series.
#[must_use]
pub const fn emits_metric(state: State) -> bool {
    matches!(
        state,
        State::Alerting | State::Pending | State::Recovering | State::Error | State::NoData
    )
}

/// Returns `true` if [`samples_for`] yields at least one sample.
fn yields_samples(transition: &StateTransition) -> bool {
    emits_metric(transition.previous_state) || emits_metric(transition.state.state)
}

/// One sample of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSample {
    /// Series labels.
    pub labels: Labels,
    /// `1.0` or the stale marker.
    pub value: f64,
    /// Evaluation time.
    pub time: DateTime<Utc>,
}

/// Computes the samples of one transition: a stale marker for a left
/// firing-like state and a `1.0` for an entered or kept one.
#[must_use]
pub fn samples_for(rule: &RuleMeta, transition: &StateTransition) -> Vec<StateSample> {
    let previous = transition.previous_state;
    let current = transition.state.state;
    let time = transition.state.last_evaluation_time;
    let base = sanitize_labels(&transition.state.labels);

    let mut samples = Vec::with_capacity(2);
    if emits_metric(previous) && previous != current {
        samples.push(StateSample {
            labels: series_labels(&base, rule, previous),
            value: stale_nan(),
            time,
        });
    }
    if emits_metric(current) {
        samples.push(StateSample {
            labels: series_labels(&base, rule, current),
            value: 1.0,
            time,
        });
    }
    samples
}

fn series_labels(base: &Labels, rule: &RuleMeta, state: State) -> Labels {
    let mut labels = base.clone();
    labels.insert(ALERT_NAME_LABEL.to_string(), rule.title.clone());
    labels.insert(RULE_UID_LABEL.to_string(), rule.uid.clone());
    let alertstate = if state == State::Pending { "pending" } else { "firing" };
    labels.insert(ALERT_STATE_LABEL.to_string(), alertstate.to_string());
    labels.insert(
        GRAFANA_ALERT_STATE_LABEL.to_string(),
        state.as_str().to_ascii_lowercase(),
    );
    labels
}

/// Groups the samples of `transitions` by evaluation time into frames.
///
/// Every frame has a single-row time column followed by one labelled
/// float column per series, named `metric_name`.
#[must_use]
pub fn frames_for(rule: &RuleMeta, transitions: &[StateTransition], metric_name: &str) -> Vec<Frame> {
    let mut by_time: BTreeMap<DateTime<Utc>, Vec<StateSample>> = BTreeMap::new();
    for transition in transitions {
        for sample in samples_for(rule, transition) {
            by_time.entry(sample.time).or_default().push(sample);
        }
    }

    by_time
        .into_iter()
        .map(|(time, samples)| {
            let mut fields = Vec::with_capacity(samples.len() + 1);
            fields.push(Field::new(TIME_FIELD, FieldValues::Time(vec![time])));
            fields.extend(samples.into_iter().map(|sample| {
                Field::new(metric_name, FieldValues::Float(vec![sample.value]))
                    .with_labels(sample.labels)
            }));
            Frame::new(metric_name, fields)
        })
        .collect()
}

/// [`Backend`] writing alert states as series to a remote-write datasource.
#[derive(Debug)]
pub struct PrometheusBackend {
    writer: Arc<dyn SeriesWriter>,
    metrics: Arc<HistorianMetrics>,
    datasource_uid: String,
    metric_name: String,
    external_labels: Labels,
    write_timeout: Duration,
}

impl PrometheusBackend {
    /// Creates the backend.
    ///
    /// # Errors
    ///
    /// Returns [`HistorianError::Config`] if no target datasource UID or
    /// no metric name is configured.
    pub fn new(
        config: &PrometheusConfig,
        writer: Arc<dyn SeriesWriter>,
        metrics: Arc<HistorianMetrics>,
    ) -> Result<Self, HistorianError> {
        if config.datasource_uid.trim().is_empty() {
            return Err(HistorianError::Config(
                "prometheus backend requires a target datasource UID".to_string(),
            ));
        }
        if config.metric_name.trim().is_empty() {
            return Err(HistorianError::Config(
                "prometheus backend requires a metric name".to_string(),
            ));
        }
        Ok(Self {
            writer,
            metrics,
            datasource_uid: config.datasource_uid.clone(),
            metric_name: config.metric_name.clone(),
            external_labels: Labels::new(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    /// Sets the labels added to every series.
    #[must_use]
    pub fn with_external_labels(mut self, labels: Labels) -> Self {
        self.external_labels = labels;
        self
    }

    /// Sets the timeout of one detached write.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

#[async_trait]
impl Backend for PrometheusBackend {
    fn record(&self, rule: &RuleMeta, transitions: &[StateTransition]) -> RecordHandle {
        let frames = frames_for(rule, transitions, &self.metric_name);
        if frames.is_empty() {
            return RecordHandle::done();
        }

        let writer = Arc::clone(&self.writer);
        let datasource_uid = self.datasource_uid.clone();
        let metric_name = self.metric_name.clone();
        let extra_labels = self.external_labels.clone();
        let org_id = rule.org_id;
        let rule_uid = rule.uid.clone();
        let count = transitions.iter().filter(|t| yields_samples(t)).count();

        spawn_write(&self.metrics, BACKEND_NAME, org_id, count, self.write_timeout, async move {
            let result = writer
                .write_datasource(
                    &datasource_uid,
                    &metric_name,
                    Utc::now(),
                    frames,
                    org_id,
                    &extra_labels,
                )
                .await;
            match result {
                Ok(()) => {
                    tracing::debug!(%rule_uid, transitions = count, "wrote state history series");
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(%rule_uid, transitions = count, error = %err, "failed to write state history series");
                    Err(err)
                }
            }
        })
    }

    async fn query(&self, _query: &HistoryQuery) -> Result<Frame, HistorianError> {
        Err(HistorianError::NotSupported(
            "prometheus state history backend is write only",
        ))
    }
}
