//! # alert-state-history
//!
//! Records alert rule state transitions to pluggable backends and answers
//! history queries about them.
//!
//! The evaluation engine hands every batch of [`domain::StateTransition`]s
//! of one rule to a [`backend::Backend`]. Writes run on detached tasks and
//! report their outcome through a [`backend::RecordHandle`]; reads are
//! served synchronously by the primary backend.
//!
//! ## Architecture
//!
//! ```text
//! Evaluation engine (external)
//!     │  RuleMeta + [StateTransition]
//!     ▼
//! MultipleBackend (backend/)
//!     │
//!     ├── LokiBackend ──────── log lines, LogQL batching, k-way merge
//!     ├── PrometheusBackend ── samples with stale markers (write only)
//!     ├── AnnotationBackend ── annotation rows + DashboardResolver
//!     └── NoOp / Sql
//!           │
//!           ├── Loki HTTP API (reqwest)
//!           ├── SeriesWriter (remote write)
//!           └── PostgreSQL persistence (sqlx)
//! ```
//!
//! [`service::build_backend`] assembles the tree from a
//! [`config::HistorianConfig`] and the collaborators in
//! [`app_state::AppState`].

pub mod access;
pub mod app_state;
pub mod backend;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod service;
