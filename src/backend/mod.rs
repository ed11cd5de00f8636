//! History backends.
//!
//! A [`Backend`] persists batches of [`StateTransition`]s and answers
//! [`HistoryQuery`]s. Writes never block the caller: `record` returns a
//! [`RecordHandle`] immediately and the actual write runs on a detached
//! task. Reads are plain async calls.

pub mod annotation;
pub mod loki;
pub mod multiple;
pub mod noop;
pub mod predicate;
pub mod prometheus;
pub mod record;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::domain::{Frame, HistoryQuery, RuleMeta, StateTransition};
use crate::error::HistorianError;

pub use self::annotation::AnnotationBackend;
pub use self::loki::LokiBackend;
pub use self::multiple::MultipleBackend;
pub use self::noop::{NoOpBackend, SqlBackend};
pub use self::prometheus::PrometheusBackend;
pub use self::record::{RecordHandle, RecordResult};

/// A destination for alert state history.
///
/// Implementations must be cheap to call from the evaluation loop: `record`
/// copies what it needs out of its arguments and returns without waiting
/// for I/O.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Records a batch of transitions of one rule.
    ///
    /// The returned handle resolves once the write has finished.
    fn record(&self, rule: &RuleMeta, transitions: &[StateTransition]) -> RecordHandle;

    /// Reads history.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot serve reads or the read fails.
    async fn query(&self, query: &HistoryQuery) -> Result<Frame, HistorianError>;
}

/// Names of the available backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// Annotation rows in the annotation store.
    Annotations,
    /// Log lines in Loki.
    Loki,
    /// Samples written to a Prometheus remote-write datasource.
    Prometheus,
    /// Fan-out over a primary and secondaries.
    Multiple,
    /// Discards everything.
    Noop,
    /// Placeholder SQL table backend.
    Sql,
}

impl BackendType {
    /// Returns the configuration name of the backend.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Annotations => "annotations",
            Self::Loki => "loki",
            Self::Prometheus => "prometheus",
            Self::Multiple => "multiple",
            Self::Noop => "noop",
            Self::Sql => "sql",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendType {
    type Err = HistorianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "annotations" => Ok(Self::Annotations),
            "loki" => Ok(Self::Loki),
            "prometheus" => Ok(Self::Prometheus),
            "multiple" => Ok(Self::Multiple),
            "noop" => Ok(Self::Noop),
            "sql" => Ok(Self::Sql),
            other => Err(HistorianError::Config(format!(
                "unrecognized state history backend: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names_case_insensitively() {
        assert_eq!("Loki".parse::<BackendType>().ok(), Some(BackendType::Loki));
        assert_eq!(
            " annotations ".parse::<BackendType>().ok(),
            Some(BackendType::Annotations)
        );
        assert!("influx".parse::<BackendType>().is_err());
    }

    #[test]
    fn display_round_trips() {
        for ty in [
            BackendType::Annotations,
            BackendType::Loki,
            BackendType::Prometheus,
            BackendType::Multiple,
            BackendType::Noop,
            BackendType::Sql,
        ] {
            assert_eq!(ty.to_string().parse::<BackendType>().ok(), Some(ty));
        }
    }
}
