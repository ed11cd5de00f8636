//! Shared collaborators injected into every backend.

use std::sync::Arc;

use prometheus::Registry;

use crate::access::{AccessControl, AllowAll, InMemoryRuleStore, RuleStore};
use crate::backend::annotation::{AnnotationRepository, DashboardStore};
use crate::backend::loki::client::LokiClient;
use crate::backend::prometheus::SeriesWriter;
use crate::error::HistorianError;
use crate::metrics::HistorianMetrics;

/// Everything [`crate::service::build_backend`] needs besides configuration.
///
/// Collaborators a backend does not use may be left empty; assembling a
/// backend whose collaborator is missing is a configuration error.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Metrics shared by all backends.
    pub metrics: Arc<HistorianMetrics>,
    /// Folder access checks for history reads.
    pub access: Arc<dyn AccessControl>,
    /// Rule lookups for history reads.
    pub rules: Arc<dyn RuleStore>,
    /// Annotation storage, required by the annotations backend.
    pub annotations: Option<Arc<dyn AnnotationRepository>>,
    /// Dashboard lookups, required by the annotations backend.
    pub dashboards: Option<Arc<dyn DashboardStore>>,
    /// Remote-write sink, required by the prometheus backend.
    pub series_writer: Option<Arc<dyn SeriesWriter>>,
    /// Loki client; an HTTP client is built from configuration if unset.
    pub loki_client: Option<Arc<dyn LokiClient>>,
}

impl AppState {
    /// Creates a state with metrics registered on `registry`, open access
    /// and an empty in-memory rule store.
    ///
    /// # Errors
    ///
    /// Returns [`HistorianError::Config`] if the metrics cannot be registered.
    pub fn new(registry: &Registry) -> Result<Self, HistorianError> {
        Ok(Self {
            metrics: Arc::new(HistorianMetrics::new(registry)?),
            access: Arc::new(AllowAll),
            rules: Arc::new(InMemoryRuleStore::new()),
            annotations: None,
            dashboards: None,
            series_writer: None,
            loki_client: None,
        })
    }

    /// Sets the access control.
    #[must_use]
    pub fn with_access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    /// Sets the rule store.
    #[must_use]
    pub fn with_rules(mut self, rules: Arc<dyn RuleStore>) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the annotation and dashboard stores.
    #[must_use]
    pub fn with_annotation_stores(
        mut self,
        annotations: Arc<dyn AnnotationRepository>,
        dashboards: Arc<dyn DashboardStore>,
    ) -> Self {
        self.annotations = Some(annotations);
        self.dashboards = Some(dashboards);
        self
    }

    /// Sets the remote-write sink.
    #[must_use]
    pub fn with_series_writer(mut self, writer: Arc<dyn SeriesWriter>) -> Self {
        self.series_writer = Some(writer);
        self
    }

    /// Sets the Loki client.
    #[must_use]
    pub fn with_loki_client(mut self, client: Arc<dyn LokiClient>) -> Self {
        self.loki_client = Some(client);
        self
    }
}
