//! Fan-out over a primary backend and any number of secondaries.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;

use super::{Backend, RecordHandle};
use crate::domain::{Frame, HistoryQuery, RuleMeta, StateTransition};
use crate::error::HistorianError;

/// Writes to every backend, reads from the primary only.
///
/// All writes start concurrently and the returned handle resolves after
/// the slowest one finished. Every failure is kept in the joined error.
#[derive(Debug)]
pub struct MultipleBackend {
    primary: Arc<dyn Backend>,
    secondaries: Vec<Arc<dyn Backend>>,
}

impl MultipleBackend {
    /// Creates a fan-out backend.
    #[must_use]
    pub fn new(primary: Arc<dyn Backend>, secondaries: Vec<Arc<dyn Backend>>) -> Self {
        Self {
            primary,
            secondaries,
        }
    }
}

#[async_trait]
impl Backend for MultipleBackend {
    fn record(&self, rule: &RuleMeta, transitions: &[StateTransition]) -> RecordHandle {
        if transitions.is_empty() {
            return RecordHandle::done();
        }

        let mut jobs = Vec::with_capacity(self.secondaries.len() + 1);
        jobs.push(self.primary.record(rule, transitions));
        for secondary in &self.secondaries {
            jobs.push(secondary.record(rule, transitions));
        }

        let (tx, handle) = RecordHandle::channel();
        tokio::spawn(async move {
            let errors = join_all(jobs)
                .await
                .into_iter()
                .filter_map(Result::err)
                .collect::<Vec<_>>();
            if !errors.is_empty() {
                tracing::debug!(failed = errors.len(), "state history fan-out finished with errors");
            }
            tx.send(HistorianError::join(errors));
        });
        handle
    }

    async fn query(&self, query: &HistoryQuery) -> Result<Frame, HistorianError> {
        self.primary.query(query).await
    }
}
