//! State history error types.
//!
//! [`HistorianError`] is the central error type for every backend. Write
//! failures travel through a [`crate::backend::RecordHandle`]; read failures
//! are returned directly from [`crate::backend::Backend::query`].

use std::fmt;

/// Server-side error enum for the state history subsystem.
///
/// # Categories
///
/// | Variants                                   | Category            |
/// |--------------------------------------------|---------------------|
/// | `Config`                                   | Construction time   |
/// | `Transport`, `Remote`, `Store`, `Timeout`  | Transient backend   |
/// | `QueryTooLong`, `InvalidQuery`             | User-actionable     |
/// | `NotSupported`                             | Capability          |
/// | `Unauthorized`, `RuleNotFound`             | Access / lookup     |
/// | `Panic`                                    | Recovered write task|
/// | `Multiple`                                 | Fan-out aggregation |
#[derive(Debug, thiserror::Error)]
pub enum HistorianError {
    /// Invalid or incomplete configuration detected while assembling a backend.
    #[error("invalid state history configuration: {0}")]
    Config(String),

    /// The generated LogQL query exceeds the configured maximum size.
    #[error(
        "query too long: size {size} exceeds the maximum of {max}; try filtering by a rule or dashboard to reduce the size: {query}"
    )]
    QueryTooLong {
        /// Computed size of the offending query, in bytes.
        size: usize,
        /// Configured maximum query size, in bytes.
        max: usize,
        /// The offending query text.
        query: String,
    },

    /// The backend does not support the requested operation.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// Network or HTTP client failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote store answered with a non-success status.
    #[error("remote store responded with status {status}: {body}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Annotation, dashboard or rule store failure.
    #[error("store error: {0}")]
    Store(String),

    /// The requesting identity may not read the requested history.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The referenced alert rule does not exist.
    #[error("alert rule not found: {0}")]
    RuleNotFound(String),

    /// The history query is malformed.
    #[error("invalid history query: {0}")]
    InvalidQuery(String),

    /// JSON encoding or decoding failure.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A detached write exceeded its timeout.
    #[error("write timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A write task panicked; the panic was recovered.
    #[error("state history write panicked: {0}")]
    Panic(String),

    /// More than one fan-out branch failed.
    #[error("{0}")]
    Multiple(MultiError),
}

impl HistorianError {
    /// Combines a list of branch errors into one outcome.
    ///
    /// No errors yields `Ok(())`, a single error is returned as is, and
    /// several errors are preserved together in [`HistorianError::Multiple`].
    ///
    /// # Errors
    ///
    /// Returns the joined error when `errors` is not empty.
    pub fn join(mut errors: Vec<Self>) -> Result<(), Self> {
        if errors.len() > 1 {
            return Err(Self::Multiple(MultiError(errors)));
        }
        errors.pop().map_or(Ok(()), Err)
    }

    /// Returns the individual causes: itself, or every branch of a
    /// [`HistorianError::Multiple`].
    #[must_use]
    pub fn causes(&self) -> Vec<&Self> {
        match self {
            Self::Multiple(multi) => multi.causes().iter().collect(),
            other => vec![other],
        }
    }
}

impl From<reqwest::Error> for HistorianError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<sqlx::Error> for HistorianError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// Aggregate of several independent failures.
///
/// Every cause is kept; `Display` prints one cause per line.
#[derive(Debug)]
pub struct MultiError(Vec<HistorianError>);

impl MultiError {
    /// Returns every aggregated cause, in the order the branches were joined.
    #[must_use]
    pub fn causes(&self) -> &[HistorianError] {
        &self.0
    }

    /// Returns the number of aggregated causes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no causes were aggregated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn join_empty_is_ok() {
        assert!(HistorianError::join(Vec::new()).is_ok());
    }

    #[test]
    fn join_single_returns_it_unwrapped() {
        let result = HistorianError::join(vec![HistorianError::Store("boom".to_string())]);
        let Err(HistorianError::Store(msg)) = result else {
            panic!("expected store error");
        };
        assert_eq!(msg, "boom");
    }

    #[test]
    fn join_many_keeps_every_cause() {
        let result = HistorianError::join(vec![
            HistorianError::Store("first".to_string()),
            HistorianError::Transport("second".to_string()),
        ]);
        let Err(err) = result else {
            panic!("expected error");
        };
        assert_eq!(err.causes().len(), 2);
        let text = err.to_string();
        assert!(text.contains("first"));
        assert!(text.contains("second"));
    }

    #[test]
    fn query_too_long_reports_size_and_query() {
        let err = HistorianError::QueryTooLong {
            size: 120,
            max: 100,
            query: "{orgID=\"1\"}".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("120"));
        assert!(text.contains("100"));
        assert!(text.contains("orgID"));
    }
}
