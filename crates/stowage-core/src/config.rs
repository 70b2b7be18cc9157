//! Configuration module
//!
//! This module provides configuration for the ingestion pipeline: database
//! pool sizing, staging and archive storage locations, upload limits,
//! session expiry, and the persistence retry policy.

use std::env;
use std::path::PathBuf;

use anyhow::Context;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_ARCHIVE_BYTES: u64 = 8 * 1024 * 1024 * 1024; // 8 GiB
const SESSION_IDLE_TIMEOUT_SECS: u64 = 24 * 3600;
const SESSION_SWEEP_INTERVAL_SECS: u64 = 3600;
const PERSIST_MAX_RETRIES: u32 = 5;
const PERSIST_BACKOFF_BASE_MS: u64 = 50;

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    /// Directory for in-flight partial uploads
    pub staging_dir: PathBuf,
    /// Root directory for relocated import archives
    pub storage_dir: PathBuf,
    pub max_archive_bytes: u64,
    /// A session with no chunk activity for this long is reclaimed
    pub session_idle_timeout_secs: u64,
    /// Interval between runs of the idle-session sweeper. 0 = disabled.
    pub session_sweep_interval_secs: u64,
    pub persist_max_retries: u32,
    pub persist_backoff_base_ms: u64,
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables, applying defaults for
    /// everything except `DATABASE_URL`.
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        Ok(Self {
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_parse("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            staging_dir: PathBuf::from(
                env::var("STOWAGE_STAGING_DIR").unwrap_or_else(|_| "./data/staging".to_string()),
            ),
            storage_dir: PathBuf::from(
                env::var("STOWAGE_STORAGE_DIR").unwrap_or_else(|_| "./data/storage".to_string()),
            ),
            max_archive_bytes: env_parse("STOWAGE_MAX_ARCHIVE_BYTES", MAX_ARCHIVE_BYTES),
            session_idle_timeout_secs: env_parse(
                "STOWAGE_SESSION_IDLE_TIMEOUT_SECS",
                SESSION_IDLE_TIMEOUT_SECS,
            ),
            session_sweep_interval_secs: env_parse(
                "STOWAGE_SESSION_SWEEP_INTERVAL_SECS",
                SESSION_SWEEP_INTERVAL_SECS,
            ),
            persist_max_retries: env_parse("STOWAGE_PERSIST_MAX_RETRIES", PERSIST_MAX_RETRIES),
            persist_backoff_base_ms: env_parse(
                "STOWAGE_PERSIST_BACKOFF_BASE_MS",
                PERSIST_BACKOFF_BASE_MS,
            ),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_parse_falls_back_on_missing() {
        assert_eq!(env_parse("STOWAGE_TEST_UNSET_KEY", 42u32), 42);
    }

    #[test]
    fn test_is_production() {
        let mut config = Config {
            database_url: "postgres://localhost/stowage".to_string(),
            db_max_connections: MAX_CONNECTIONS,
            db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            staging_dir: PathBuf::from("./data/staging"),
            storage_dir: PathBuf::from("./data/storage"),
            max_archive_bytes: MAX_ARCHIVE_BYTES,
            session_idle_timeout_secs: SESSION_IDLE_TIMEOUT_SECS,
            session_sweep_interval_secs: SESSION_SWEEP_INTERVAL_SECS,
            persist_max_retries: PERSIST_MAX_RETRIES,
            persist_backoff_base_ms: PERSIST_BACKOFF_BASE_MS,
            environment: "development".to_string(),
        };
        assert!(!config.is_production());

        config.environment = "Production".to_string();
        assert!(config.is_production());

        config.environment = "prod".to_string();
        assert!(config.is_production());
    }
}
