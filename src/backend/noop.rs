//! Backends that store nothing.

use async_trait::async_trait;

use super::{Backend, RecordHandle};
use crate::domain::{Frame, HistoryQuery, RuleMeta, StateTransition};
use crate::error::HistorianError;

/// Accepts every write and returns empty history.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpBackend;

impl NoOpBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for NoOpBackend {
    fn record(&self, _rule: &RuleMeta, _transitions: &[StateTransition]) -> RecordHandle {
        RecordHandle::done()
    }

    async fn query(&self, _query: &HistoryQuery) -> Result<Frame, HistorianError> {
        Ok(Frame::new("states", Vec::new()))
    }
}

/// Placeholder for a relational history table.
///
/// Writes are accepted and dropped; reads are not supported yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlBackend;

impl SqlBackend {
    /// Creates the backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for SqlBackend {
    fn record(&self, rule: &RuleMeta, transitions: &[StateTransition]) -> RecordHandle {
        tracing::debug!(rule_uid = %rule.uid, count = transitions.len(), "sql state history backend discards writes");
        RecordHandle::done()
    }

    async fn query(&self, _query: &HistoryQuery) -> Result<Frame, HistorianError> {
        Err(HistorianError::NotSupported("sql state history backend does not support queries"))
    }
}
