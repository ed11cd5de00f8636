//! PostgreSQL implementation of the annotation and dashboard stores.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::models::{ANNOTATION_COLUMNS, AnnotationRow, StoredDashboard, item_from_row};
use crate::backend::annotation::{
    AnnotationItem, AnnotationQuery, AnnotationRepository, DashboardStore,
};
use crate::config::DatabaseConfig;
use crate::error::HistorianError;

/// Rows returned by [`PostgresAnnotationRepository::find`] when the query
/// sets no limit.
pub const DEFAULT_FIND_LIMIT: usize = 100;

/// Rows per `INSERT` statement; keeps bind parameters below Postgres' limit.
const INSERT_CHUNK: usize = 1000;

/// Opens a connection pool.
///
/// # Errors
///
/// Returns a [`HistorianError::Store`] if the database is unreachable.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, HistorianError> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| HistorianError::Store(format!("failed to connect to database: {e}")))
}

/// Applies the embedded migrations.
///
/// # Errors
///
/// Returns a [`HistorianError::Store`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), HistorianError> {
    sqlx::migrate!()
        .run(pool)
        .await
        .map_err(|e| HistorianError::Store(format!("migration failed: {e}")))
}

/// Annotation repository on the `annotation` table.
#[derive(Debug, Clone)]
pub struct PostgresAnnotationRepository {
    pool: PgPool,
}

impl PostgresAnnotationRepository {
    /// Creates a repository with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnnotationRepository for PostgresAnnotationRepository {
    async fn save_many(&self, items: &[AnnotationItem]) -> Result<(), HistorianError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HistorianError::Store(e.to_string()))?;
        for chunk in items.chunks(INSERT_CHUNK) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO annotation (org_id, alert_id, dashboard_uid, dashboard_id, panel_id, \
                 epoch, epoch_end, text, prev_state, new_state, data) ",
            );
            builder.push_values(chunk, |mut row, item| {
                row.push_bind(item.org_id)
                    .push_bind(item.alert_id)
                    .push_bind(item.dashboard_uid.clone())
                    .push_bind(item.dashboard_id)
                    .push_bind(item.panel_id)
                    .push_bind(item.epoch)
                    .push_bind(item.epoch_end)
                    .push_bind(item.text.clone())
                    .push_bind(item.prev_state.clone())
                    .push_bind(item.new_state.clone())
                    .push_bind(item.data.clone());
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| HistorianError::Store(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| HistorianError::Store(e.to_string()))?;

        Ok(())
    }

    async fn find(&self, query: &AnnotationQuery) -> Result<Vec<AnnotationItem>, HistorianError> {
        let limit = match query.limit {
            0 => DEFAULT_FIND_LIMIT,
            n => n,
        };
        let rows = sqlx::query_as::<_, AnnotationRow>(&format!(
            "SELECT {ANNOTATION_COLUMNS} FROM annotation \
             WHERE org_id = $1 AND alert_id = $2 AND epoch >= $3 AND epoch <= $4 \
             ORDER BY epoch ASC, id ASC LIMIT $5"
        ))
        .bind(query.org_id)
        .bind(query.alert_id)
        .bind(query.from)
        .bind(query.to)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistorianError::Store(e.to_string()))?;

        Ok(rows.into_iter().map(item_from_row).collect())
    }
}

/// Dashboard lookups on the `dashboard` table.
#[derive(Debug, Clone)]
pub struct PostgresDashboardStore {
    pool: PgPool,
}

impl PostgresDashboardStore {
    /// Creates a store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads dashboard `uid` of `org_id`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns a [`HistorianError::Store`] on database failure.
    pub async fn get(&self, org_id: i64, uid: &str) -> Result<Option<StoredDashboard>, HistorianError> {
        let row = sqlx::query_as::<_, (i64, i64, String, String)>(
            "SELECT id, org_id, uid, title FROM dashboard WHERE org_id = $1 AND uid = $2",
        )
        .bind(org_id)
        .bind(uid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| HistorianError::Store(e.to_string()))?;

        Ok(row.map(|(id, org_id, uid, title)| StoredDashboard {
            id,
            org_id,
            uid,
            title,
        }))
    }
}

#[async_trait]
impl DashboardStore for PostgresDashboardStore {
    async fn get_dashboard_id(&self, org_id: i64, uid: &str) -> Result<Option<i64>, HistorianError> {
        Ok(self.get(org_id, uid).await?.map(|dashboard| dashboard.id))
    }
}
