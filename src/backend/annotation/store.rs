//! Annotation rows and the store writing them.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::resolver::DashboardResolver;
use crate::domain::PanelKey;
use crate::error::HistorianError;


/// One annotation: a state transition pinned to the timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationItem {
    /// Row ID, 0 until stored.
    pub id: i64,
    /// Owning organization.
    pub org_id: i64,
    /// Numeric ID of the alert rule.
    pub alert_id: i64,
    /// Dashboard the rule is attached to, if any.
    pub dashboard_uid: Option<String>,
    /// Numeric ID of that dashboard, 0 if unknown.
    pub dashboard_id: i64,
    /// Panel the rule is attached to, 0 if none.
    pub panel_id: i64,
    /// Start, in milliseconds since the Unix epoch.
    pub epoch: i64,
    /// End, in milliseconds since the Unix epoch.
    pub epoch_end: i64,
    /// Human readable summary.
    pub text: String,
    /// Formatted previous state.
    pub prev_state: String,
    /// Formatted new state.
    pub new_state: String,
    /// Values, error or no-data marker.
    pub data: Value,
}

/// Filter for [`AnnotationRepository::find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationQuery {
    /// Organization to search.
    pub org_id: i64,
    /// Only annotations of this alert rule.
    pub alert_id: i64,
    /// Lower bound on `epoch`, inclusive, in milliseconds.
    pub from: i64,
    /// Upper bound on `epoch`, inclusive, in milliseconds.
    pub to: i64,
    /// Maximum rows; 0 means the repository default.
    pub limit: usize,
}

/// Persistent storage for annotations.
#[async_trait]
pub trait AnnotationRepository: Send + Sync + fmt::Debug {
    /// Stores all `items` in one operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the items cannot be stored; then none are.
    async fn save_many(&self, items: &[AnnotationItem]) -> Result<(), HistorianError>;

    /// Returns the annotations matching `query`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be read.
    async fn find(&self, query: &AnnotationQuery) -> Result<Vec<AnnotationItem>, HistorianError>;
}

/// Writes annotation batches, linking them to dashboards.
#[derive(Debug)]
pub struct AnnotationStore {
    repository: Arc<dyn AnnotationRepository>,
    resolver: Arc<DashboardResolver>,
}

impl AnnotationStore {
    /// Creates the store.
    #[must_use]
    pub fn new(
        repository: Arc<dyn AnnotationRepository>,
        resolver: Arc<DashboardResolver>,
    ) -> Self {
        Self {
            repository,
            resolver,
        }
    }

    /// Saves `items` of `org_id`.
    ///
    /// With a `panel`, every item is linked to it. A dashboard that cannot
    /// be resolved is logged and linked with ID 0.
    ///
    /// # Errors
    ///
    /// Returns the repository error if the batch cannot be stored.
    pub async fn save(
        &self,
        panel: Option<&PanelKey>,
        mut items: Vec<AnnotationItem>,
        org_id: i64,
    ) -> Result<(), HistorianError> {
        if let Some(panel) = panel {
            let dashboard_id = match self.resolver.get_id(panel.org_id, &panel.dashboard_uid).await {
                Ok(id) => id,
                Err(err) => {
                    tracing::error!(
                        dashboard_uid = %panel.dashboard_uid,
                        error = %err,
                        "failed to resolve dashboard for annotations, saving without dashboard ID"
                    );
                    0
                }
            };
            for item in &mut items {
                item.dashboard_uid = Some(panel.dashboard_uid.clone());
                item.dashboard_id = dashboard_id;
                item.panel_id = panel.panel_id;
            }
        }

        if let Err(err) = self.repository.save_many(&items).await {
            tracing::error!(org_id, count = items.len(), error = %err, "failed to save annotations");
            return Err(err);
        }
        tracing::debug!(org_id, count = items.len(), "saved annotations");
        Ok(())
    }

    /// Returns the annotations matching `query`.
    ///
    /// # Errors
    ///
    /// Returns the repository error if the search fails.
    pub async fn find(&self, query: &AnnotationQuery) -> Result<Vec<AnnotationItem>, HistorianError> {
        self.repository.find(query).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::backend::annotation::resolver::DashboardStore;
    use crate::backend::annotation::resolver::tests::FakeDashboards;

    /// Keeps saved annotations in memory.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryAnnotations {
        pub(crate) items: Mutex<Vec<AnnotationItem>>,
        pub(crate) saves: Mutex<usize>,
        pub(crate) fail: bool,
    }

    impl MemoryAnnotations {
        pub(crate) fn items(&self) -> Vec<AnnotationItem> {
            self.items.lock().map(|i| i.clone()).unwrap_or_default()
        }

        pub(crate) fn saves(&self) -> usize {
            self.saves.lock().map(|s| *s).unwrap_or_default()
        }
    }

    #[async_trait]
    impl AnnotationRepository for MemoryAnnotations {
        async fn save_many(&self, items: &[AnnotationItem]) -> Result<(), HistorianError> {
            if let Ok(mut saves) = self.saves.lock() {
                *saves += 1;
            }
            if self.fail {
                return Err(HistorianError::Store("database is read only".to_string()));
            }
            if let Ok(mut stored) = self.items.lock() {
                stored.extend(items.iter().cloned());
            }
            Ok(())
        }

        async fn find(&self, query: &AnnotationQuery) -> Result<Vec<AnnotationItem>, HistorianError> {
            let mut found = self
                .items()
                .into_iter()
                .filter(|item| {
                    item.org_id == query.org_id
                        && item.alert_id == query.alert_id
                        && item.epoch >= query.from
                        && item.epoch <= query.to
                })
                .collect::<Vec<_>>();
            found.sort_by_key(|item| item.epoch);
            if query.limit > 0 {
                found.truncate(query.limit);
            }
            Ok(found)
        }
    }

    fn store(
        repository: &Arc<MemoryAnnotations>,
        dashboards: FakeDashboards,
    ) -> AnnotationStore {
        let resolver = DashboardResolver::new(
            Arc::new(dashboards) as Arc<dyn DashboardStore>,
            Duration::from_secs(60),
        );
        AnnotationStore::new(
            Arc::clone(repository) as Arc<dyn AnnotationRepository>,
            Arc::new(resolver),
        )
    }

    fn panel(uid: &str) -> PanelKey {
        PanelKey {
            org_id: 1,
            dashboard_uid: uid.to_string(),
            panel_id: 42,
        }
    }

    #[tokio::test]
    async fn links_items_to_the_resolved_dashboard() {
        let repository = Arc::new(MemoryAnnotations::default());
        let store = store(&repository, FakeDashboards::with(1, "dash-1", 77));

        let items = vec![AnnotationItem::default(), AnnotationItem::default()];
        assert!(store.save(Some(&panel("dash-1")), items, 1).await.is_ok());

        let saved = repository.items();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|item| item.dashboard_id == 77
            && item.panel_id == 42
            && item.dashboard_uid.as_deref() == Some("dash-1")));
        assert_eq!(repository.saves(), 1);
    }

    #[tokio::test]
    async fn unresolved_dashboard_falls_back_to_zero() {
        let repository = Arc::new(MemoryAnnotations::default());
        let store = store(&repository, FakeDashboards::default());

        assert!(store.save(Some(&panel("missing")), vec![AnnotationItem::default()], 1).await.is_ok());
        let saved = repository.items();
        let Some(item) = saved.first() else {
            panic!("expected a saved item");
        };
        assert_eq!(item.dashboard_id, 0);
        assert_eq!(item.panel_id, 42);
    }

    #[tokio::test]
    async fn without_panel_items_are_saved_unlinked() {
        let repository = Arc::new(MemoryAnnotations::default());
        let store = store(&repository, FakeDashboards::default());

        assert!(store.save(None, vec![AnnotationItem::default()], 1).await.is_ok());
        assert!(repository.items().iter().all(|item| item.dashboard_uid.is_none()));
    }

    #[tokio::test]
    async fn failed_save_is_returned() {
        let repository = Arc::new(MemoryAnnotations {
            fail: true,
            ..MemoryAnnotations::default()
        });
        let store = store(&repository, FakeDashboards::default());

        let result = store
            .save(None, vec![AnnotationItem::default(), AnnotationItem::default()], 3)
            .await;
        assert!(matches!(result, Err(HistorianError::Store(_))));
        assert_eq!(repository.saves(), 1);
        assert!(repository.items().is_empty());
    }
}
