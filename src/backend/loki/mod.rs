//! State history stored as log lines in Loki.
//!
//! Every `record` call becomes one stream (rule-level labels) whose lines
//! are JSON encoded [`LokiEntry`] values. Reads are scoped to the folders
//! the requesting identity may see, split into size-bounded LogQL queries
//! and merged back into a single time-ordered frame.

pub mod client;
pub mod entry;
pub mod merge;
pub mod query;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use self::client::LokiClient;
use self::merge::merge;
use self::query::build_log_queries;
use super::record::spawn_write;
use super::{Backend, RecordHandle};
use crate::access::{AccessControl, RuleStore};
use crate::config::LokiConfig;
use crate::domain::{Frame, HistoryQuery, Labels, RuleMeta, StateTransition};
use crate::error::HistorianError;
use crate::metrics::HistorianMetrics;

pub use self::client::{HttpLokiClient, Sample, Stream};
pub use self::entry::{LokiEntry, transitions_to_stream};

const BACKEND_NAME: &str = "loki";
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(60);

/// [`Backend`] writing to and reading from Loki.
#[derive(Debug)]
pub struct LokiBackend {
    client: Arc<dyn LokiClient>,
    access: Arc<dyn AccessControl>,
    rules: Arc<dyn RuleStore>,
    metrics: Arc<HistorianMetrics>,
    external_labels: Labels,
    write_timeout: Duration,
    max_query_length: chrono::Duration,
}

impl LokiBackend {
    /// Creates a backend with default timeouts and no external labels.
    #[must_use]
    pub fn new(
        client: Arc<dyn LokiClient>,
        access: Arc<dyn AccessControl>,
        rules: Arc<dyn RuleStore>,
        metrics: Arc<HistorianMetrics>,
    ) -> Self {
        Self {
            client,
            access,
            rules,
            metrics,
            external_labels: Labels::new(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_query_length: to_chrono(LokiConfig::default().max_query_length),
        }
    }

    /// Sets the static labels added to every stream.
    #[must_use]
    pub fn with_external_labels(mut self, labels: Labels) -> Self {
        self.external_labels = labels;
        self
    }

    /// Sets the timeout of one detached push.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the longest time range a single read may cover.
    #[must_use]
    pub fn with_max_query_length(mut self, length: Duration) -> Self {
        self.max_query_length = to_chrono(length);
        self
    }

    /// Checks that Loki answers on the read path.
    ///
    /// # Errors
    ///
    /// Returns the client's error if Loki cannot be reached.
    pub async fn test_connection(&self) -> Result<(), HistorianError> {
        self.client.ping().await
    }

    /// Resolves the folders `query` may read.
    ///
    /// `None` means no restriction. A rule-scoped query is authorized
    /// against that rule's folder only.
    async fn folder_uids_for_filter(
        &self,
        query: &HistoryQuery,
    ) -> Result<Option<Vec<String>>, HistorianError> {
        let Some(identity) = &query.identity else {
            return Err(HistorianError::Unauthorized(
                "no identity attached to the history query".to_string(),
            ));
        };
        if self.access.can_read_all_rules(identity).await? {
            return Ok(None);
        }

        if let Some(rule_uid) = &query.rule_uid {
            let rule = self
                .rules
                .get_alert_rule_by_uid(query.org_id, rule_uid)
                .await?;
            self.access.authorize_access_in_folder(identity, &rule).await?;
            return Ok(Some(vec![rule.namespace_uid]));
        }

        let folders = self
            .rules
            .get_user_visible_namespaces(query.org_id, identity)
            .await?;
        let mut uids = Vec::with_capacity(folders.len());
        for folder in folders {
            if self.access.has_access_in_folder(identity, &folder).await? {
                uids.push(folder.uid);
            }
        }
        if uids.is_empty() {
            return Err(HistorianError::Unauthorized(format!(
                "user {} cannot read rules in any folder",
                identity.login
            )));
        }
        uids.sort();
        Ok(Some(uids))
    }
}

#[async_trait]
impl Backend for LokiBackend {
    fn record(&self, rule: &RuleMeta, transitions: &[StateTransition]) -> RecordHandle {
        let stream = transitions_to_stream(rule, transitions, &self.external_labels);
        if stream.values.is_empty() {
            return RecordHandle::done();
        }

        let client = Arc::clone(&self.client);
        let metrics = Arc::clone(&self.metrics);
        let rule_uid = rule.uid.clone();
        let count = stream.values.len();

        spawn_write(&self.metrics, BACKEND_NAME, rule.org_id, count, self.write_timeout, async move {
            match client.push(std::slice::from_ref(&stream)).await {
                Ok(bytes) => {
                    metrics
                        .bytes_written
                        .with_label_values(&[BACKEND_NAME])
                        .inc_by(bytes as u64);
                    tracing::debug!(%rule_uid, entries = count, bytes, "wrote state history to Loki");
                    Ok(())
                }
                Err(err) => {
                    tracing::error!(%rule_uid, entries = count, error = %err, "failed to write state history to Loki");
                    Err(err)
                }
            }
        })
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Frame, HistorianError> {
        let folder_uids = self.folder_uids_for_filter(query).await?;

        let (mut from, to) = query.time_range(Utc::now());
        if to - from > self.max_query_length {
            let narrowed = to - self.max_query_length;
            tracing::debug!(%from, %narrowed, %to, "narrowing state history query to the maximum query length");
            from = narrowed;
        }

        let queries = build_log_queries(query, folder_uids.as_deref(), self.client.max_query_size())?;
        tracing::debug!(org_id = query.org_id, batches = queries.len(), "querying state history in Loki");

        let mut streams = Vec::new();
        for logql in &queries {
            let res = self.client.range_query(logql, from, to, query.limit).await?;
            streams.extend(res.data.result);
        }
        Ok(merge(&streams, folder_uids.as_deref()))
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
