//! state-historian entry point.
//!
//! Builds the configured state history backend and records batches read as
//! newline-delimited JSON from stdin:
//!
//! ```text
//! {"rule": {...}, "transitions": [{...}, ...]}
//! ```

use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use alert_state_history::app_state::AppState;
use alert_state_history::backend::BackendType;
use alert_state_history::backend::loki::HttpLokiClient;
use alert_state_history::backend::loki::client::LokiClient;
use alert_state_history::config::HistorianConfig;
use alert_state_history::domain::{RuleMeta, StateTransition};
use alert_state_history::persistence;
use alert_state_history::service::{LogSeriesWriter, build_backend};

/// One line of input.
#[derive(Debug, Deserialize)]
struct Batch {
    rule: RuleMeta,
    #[serde(default)]
    transitions: Vec<StateTransition>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = HistorianConfig::from_env().context("failed to load configuration")?;
    tracing::info!(backend = %config.backend, enabled = config.enabled, "starting state-historian");

    // Build collaborators
    let registry = prometheus::Registry::new();
    let mut state = AppState::new(&registry)?.with_series_writer(Arc::new(LogSeriesWriter));
    let enabled = if config.enabled {
        config.enabled_backends()
    } else {
        Vec::new()
    };

    if enabled.contains(&BackendType::Annotations) {
        let pool = persistence::connect(&config.database).await?;
        persistence::migrate(&pool).await?;
        tracing::info!("database ready");
        state = state.with_annotation_stores(
            Arc::new(persistence::PostgresAnnotationRepository::new(pool.clone())),
            Arc::new(persistence::PostgresDashboardStore::new(pool)),
        );
    }

    if enabled.contains(&BackendType::Loki) {
        let client = HttpLokiClient::new(&config.loki)?;
        match client.ping().await {
            Ok(()) => tracing::info!(url = %config.loki.read_url, "loki is reachable"),
            Err(err) => tracing::warn!(error = %err, "loki ping failed, continuing"),
        }
        state = state.with_loki_client(Arc::new(client));
    }

    // Build backend
    let backend = build_backend(&config, &state).context("failed to build backend")?;

    // Record batches from stdin
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut recorded = 0usize;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let batch: Batch = match serde_json::from_str(&line) {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed batch");
                continue;
            }
        };
        let count = batch.transitions.len();
        match backend.record(&batch.rule, &batch.transitions).await {
            Ok(()) => {
                recorded += 1;
                tracing::info!(rule_uid = %batch.rule.uid, transitions = count, "recorded batch");
            }
            Err(err) => {
                tracing::error!(rule_uid = %batch.rule.uid, transitions = count, error = %err, "failed to record batch");
            }
        }
    }

    tracing::info!(batches = recorded, "input closed, shutting down");
    Ok(())
}
