//! Service layer: backend assembly from configuration.
//!
//! [`build_backend`] turns a validated [`HistorianConfig`] and the shared
//! collaborators in [`AppState`] into one [`Backend`], fanning out through
//! a [`MultipleBackend`] when several backends are configured.

pub mod log_writer;

use std::sync::Arc;

use crate::app_state::AppState;
use crate::backend::annotation::{AnnotationStore, DashboardResolver};
use crate::backend::loki::HttpLokiClient;
use crate::backend::loki::client::LokiClient;
use crate::backend::{
    AnnotationBackend, Backend, BackendType, LokiBackend, MultipleBackend, NoOpBackend,
    PrometheusBackend, SqlBackend,
};
use crate::config::HistorianConfig;
use crate::error::HistorianError;

pub use log_writer::LogSeriesWriter;

/// Builds the configured backend.
///
/// A disabled historian yields a [`NoOpBackend`]. Every built backend is
/// reported through the `backend_info` metric.
///
/// # Errors
///
/// Returns [`HistorianError::Config`] if the configuration is invalid or a
/// backend's collaborator is missing from `state`.
pub fn build_backend(
    config: &HistorianConfig,
    state: &AppState,
) -> Result<Arc<dyn Backend>, HistorianError> {
    if !config.enabled {
        tracing::info!("state history is disabled");
        return Ok(Arc::new(NoOpBackend::new()));
    }
    config.validate()?;

    let backend = match config.backend {
        BackendType::Multiple => {
            let Some(primary) = config.primary else {
                return Err(HistorianError::Config(
                    "multiple backend requires a primary".to_string(),
                ));
            };
            let primary = build_single(primary, config, state)?;
            let secondaries = config
                .secondaries
                .iter()
                .map(|ty| build_single(*ty, config, state))
                .collect::<Result<Vec<_>, _>>()?;
            Arc::new(MultipleBackend::new(primary, secondaries)) as Arc<dyn Backend>
        }
        other => build_single(other, config, state)?,
    };

    for ty in config.enabled_backends() {
        state.metrics.info.with_label_values(&[ty.as_str()]).set(1);
    }
    tracing::info!(
        backend = %config.backend,
        enabled = ?config.enabled_backends(),
        "state history backend ready"
    );
    Ok(backend)
}

fn build_single(
    ty: BackendType,
    config: &HistorianConfig,
    state: &AppState,
) -> Result<Arc<dyn Backend>, HistorianError> {
    let backend: Arc<dyn Backend> = match ty {
        BackendType::Annotations => {
            let (Some(annotations), Some(dashboards)) = (&state.annotations, &state.dashboards)
            else {
                return Err(HistorianError::Config(
                    "annotations backend requires annotation and dashboard stores".to_string(),
                ));
            };
            let resolver = DashboardResolver::new(Arc::clone(dashboards), config.dashboard_cache_ttl);
            let store = AnnotationStore::new(Arc::clone(annotations), Arc::new(resolver));
            Arc::new(
                AnnotationBackend::new(
                    Arc::new(store),
                    Arc::clone(&state.rules),
                    Arc::clone(&state.metrics),
                )
                .with_write_timeout(config.write_timeout),
            )
        }
        BackendType::Loki => {
            let client = match &state.loki_client {
                Some(client) => Arc::clone(client),
                None => Arc::new(HttpLokiClient::new(&config.loki)?) as Arc<dyn LokiClient>,
            };
            Arc::new(
                LokiBackend::new(
                    client,
                    Arc::clone(&state.access),
                    Arc::clone(&state.rules),
                    Arc::clone(&state.metrics),
                )
                .with_external_labels(config.external_labels.clone())
                .with_write_timeout(config.write_timeout)
                .with_max_query_length(config.loki.max_query_length),
            )
        }
        BackendType::Prometheus => {
            let Some(writer) = &state.series_writer else {
                return Err(HistorianError::Config(
                    "prometheus backend requires a series writer".to_string(),
                ));
            };
            Arc::new(
                PrometheusBackend::new(
                    &config.prometheus,
                    Arc::clone(writer),
                    Arc::clone(&state.metrics),
                )?
                .with_external_labels(config.external_labels.clone())
                .with_write_timeout(config.write_timeout),
            )
        }
        BackendType::Noop => Arc::new(NoOpBackend::new()),
        BackendType::Sql => Arc::new(SqlBackend::new()),
        BackendType::Multiple => {
            return Err(HistorianError::Config(
                "multiple backend cannot be nested".to_string(),
            ));
        }
    };
    tracing::debug!(backend = %ty, "built state history backend");
    Ok(backend)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use prometheus::Registry;

    use super::*;
    use crate::domain::{HistoryQuery, RuleMeta};

    fn state() -> (Registry, AppState) {
        let registry = Registry::new();
        let Ok(state) = AppState::new(&registry) else {
            panic!("state should build");
        };
        (registry, state)
    }

    fn config(backend: BackendType) -> HistorianConfig {
        HistorianConfig {
            backend,
            ..HistorianConfig::default()
        }
    }

    #[tokio::test]
    async fn disabled_historian_is_a_noop() {
        let (_registry, state) = state();
        let config = HistorianConfig {
            enabled: false,
            ..config(BackendType::Annotations)
        };
        let Ok(backend) = build_backend(&config, &state) else {
            panic!("disabled historian should build");
        };
        assert!(backend.record(&RuleMeta::default(), &[]).await.is_ok());
        assert!(backend.query(&HistoryQuery::default()).await.is_ok_and(|f| f.rows() == 0));
    }

    #[test]
    fn annotations_need_their_stores() {
        let (_registry, state) = state();
        assert!(matches!(
            build_backend(&config(BackendType::Annotations), &state),
            Err(HistorianError::Config(_))
        ));
    }

    #[test]
    fn prometheus_needs_a_writer_and_datasource() {
        let (_registry, state) = state();
        let mut config = config(BackendType::Prometheus);
        config.prometheus.datasource_uid = "prom".to_string();
        assert!(matches!(build_backend(&config, &state), Err(HistorianError::Config(_))));

        let state = state.with_series_writer(Arc::new(LogSeriesWriter));
        assert!(build_backend(&config, &state).is_ok());

        config.prometheus.datasource_uid.clear();
        assert!(matches!(build_backend(&config, &state), Err(HistorianError::Config(_))));
    }

    #[test]
    fn loki_builds_an_http_client_from_config() {
        let (_registry, state) = state();
        let mut config = config(BackendType::Loki);
        config.loki.read_url = "http://localhost:3100".to_string();
        config.loki.write_url = "http://localhost:3100".to_string();
        assert!(build_backend(&config, &state).is_ok());
    }

    #[tokio::test]
    async fn multiple_reads_from_primary() {
        let (_registry, state) = state();
        let config = HistorianConfig {
            primary: Some(BackendType::Sql),
            secondaries: vec![BackendType::Noop],
            ..config(BackendType::Multiple)
        };
        let Ok(backend) = build_backend(&config, &state) else {
            panic!("multiple backend should build");
        };
        assert!(matches!(
            backend.query(&HistoryQuery::default()).await,
            Err(HistorianError::NotSupported(_))
        ));
        assert_eq!(state.metrics.info.with_label_values(&["sql"]).get(), 1);
        assert_eq!(state.metrics.info.with_label_values(&["noop"]).get(), 1);
        assert_eq!(state.metrics.info.with_label_values(&["multiple"]).get(), 0);
    }

    #[test]
    fn invalid_multiple_config_is_rejected() {
        let (_registry, state) = state();
        let config = HistorianConfig {
            primary: Some(BackendType::Noop),
            secondaries: vec![BackendType::Noop],
            ..config(BackendType::Multiple)
        };
        assert!(matches!(build_backend(&config, &state), Err(HistorianError::Config(_))));
    }
}
