//! Prometheus metrics for the state history backends.
//!
//! [`HistorianMetrics`] is built once against an explicit
//! [`prometheus::Registry`] and shared (behind an `Arc`) by every backend.

use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

use crate::error::HistorianError;

const NAMESPACE: &str = "alerting";
const SUBSYSTEM: &str = "state_history";

/// Counters and gauges describing history writes.
#[derive(Debug, Clone)]
pub struct HistorianMetrics {
    /// Set to 1 for every configured backend, labelled by `backend`.
    pub info: IntGaugeVec,
    /// Transitions handed to a backend, labelled by `org`.
    pub transitions_total: IntCounterVec,
    /// Transitions whose batch failed to persist, labelled by `org`.
    pub transitions_failed: IntCounterVec,
    /// Write batches attempted, labelled by `org` and `backend`.
    pub writes_total: IntCounterVec,
    /// Write batches that failed, labelled by `org` and `backend`.
    pub writes_failed: IntCounterVec,
    /// Payload bytes written, labelled by `backend`.
    pub bytes_written: IntCounterVec,
    /// Detached write tasks currently running.
    pub active_writes: IntGauge,
    /// Duration of a single batch write, labelled by `backend`.
    pub persist_duration: HistogramVec,
}

impl HistorianMetrics {
    /// Creates the metrics and registers them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`HistorianError::Config`] if a metric cannot be created or
    /// is already registered.
    pub fn new(registry: &Registry) -> Result<Self, HistorianError> {
        let metrics = Self {
            info: IntGaugeVec::new(opts("backend_info", "Configured state history backends."), &["backend"])
                .map_err(config_err)?,
            transitions_total: IntCounterVec::new(
                opts("transitions_total", "The total number of state transitions processed."),
                &["org"],
            )
            .map_err(config_err)?,
            transitions_failed: IntCounterVec::new(
                opts(
                    "transitions_failed_total",
                    "The total number of state transitions that failed to be written.",
                ),
                &["org"],
            )
            .map_err(config_err)?,
            writes_total: IntCounterVec::new(
                opts("writes_total", "The total number of state history batches written."),
                &["org", "backend"],
            )
            .map_err(config_err)?,
            writes_failed: IntCounterVec::new(
                opts(
                    "writes_failed_total",
                    "The total number of failed writes of state history batches.",
                ),
                &["org", "backend"],
            )
            .map_err(config_err)?,
            bytes_written: IntCounterVec::new(
                opts("writes_bytes_total", "The total number of bytes sent within a batch."),
                &["backend"],
            )
            .map_err(config_err)?,
            active_writes: IntGauge::with_opts(opts(
                "active_writes",
                "The number of state history writes currently in flight.",
            ))
            .map_err(config_err)?,
            persist_duration: HistogramVec::new(
                HistogramOpts::new(
                    "request_duration_seconds",
                    "Histogram of state history write durations.",
                )
                .namespace(NAMESPACE)
                .subsystem(SUBSYSTEM),
                &["backend"],
            )
            .map_err(config_err)?,
        };

        registry.register(Box::new(metrics.info.clone())).map_err(config_err)?;
        registry
            .register(Box::new(metrics.transitions_total.clone()))
            .map_err(config_err)?;
        registry
            .register(Box::new(metrics.transitions_failed.clone()))
            .map_err(config_err)?;
        registry
            .register(Box::new(metrics.writes_total.clone()))
            .map_err(config_err)?;
        registry
            .register(Box::new(metrics.writes_failed.clone()))
            .map_err(config_err)?;
        registry
            .register(Box::new(metrics.bytes_written.clone()))
            .map_err(config_err)?;
        registry
            .register(Box::new(metrics.active_writes.clone()))
            .map_err(config_err)?;
        registry
            .register(Box::new(metrics.persist_duration.clone()))
            .map_err(config_err)?;

        Ok(metrics)
    }

    /// Records a write attempt of `transitions` entries for `org`.
    pub fn record_attempt(&self, org: &str, backend: &str, transitions: usize) {
        self.writes_total.with_label_values(&[org, backend]).inc();
        self.transitions_total
            .with_label_values(&[org])
            .inc_by(transitions as u64);
    }

    /// Records a failed write of `transitions` entries for `org`.
    pub fn record_failure(&self, org: &str, backend: &str, transitions: usize) {
        self.writes_failed.with_label_values(&[org, backend]).inc();
        self.transitions_failed
            .with_label_values(&[org])
            .inc_by(transitions as u64);
    }
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace(NAMESPACE).subsystem(SUBSYSTEM)
}

fn config_err(err: prometheus::Error) -> HistorianError {
    HistorianError::Config(format!("metrics: {err}"))
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn registers_against_explicit_registry() {
        let registry = Registry::new();
        let Ok(metrics) = HistorianMetrics::new(&registry) else {
            panic!("metrics registration failed");
        };
        metrics.record_attempt("1", "loki", 3);
        metrics.record_failure("1", "loki", 3);
        assert_eq!(metrics.writes_total.with_label_values(&["1", "loki"]).get(), 1);
        assert_eq!(metrics.transitions_failed.with_label_values(&["1"]).get(), 3);
        assert!(!registry.gather().is_empty());
    }

    #[test]
    fn double_registration_fails() {
        let registry = Registry::new();
        assert!(HistorianMetrics::new(&registry).is_ok());
        assert!(HistorianMetrics::new(&registry).is_err());
    }
}
