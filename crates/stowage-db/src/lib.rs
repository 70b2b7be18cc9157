//! Stowage DB Library
//!
//! sqlx/Postgres data access for import records: the repository with its
//! idempotent, retry-wrapped create path, pool construction, and embedded
//! migrations.

pub mod db;

// Re-export commonly used types
pub use db::import::{ImportRequestRepository, ImportStore, NewImportRequest};
pub use db::retry::{is_transient_conflict, WriteRetryPolicy};

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use stowage_core::Config;

/// Build a connection pool from configuration.
pub async fn connect(config: &Config) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds))
        .connect(&config.database_url)
        .await
}

/// Run embedded migrations against the given pool.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
