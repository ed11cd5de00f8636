//! Persistence layer: PostgreSQL annotation and dashboard stores.
//!
//! Implements [`AnnotationRepository`](crate::backend::annotation::AnnotationRepository)
//! and [`DashboardStore`](crate::backend::annotation::DashboardStore) on
//! `sqlx::PgPool`. The schema lives in `migrations/`.

pub mod models;
pub mod postgres;

pub use postgres::{PostgresAnnotationRepository, PostgresDashboardStore, connect, migrate};
