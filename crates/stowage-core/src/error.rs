//! Error types module
//!
//! This module provides the core error types used throughout the stowage
//! pipeline. All errors are unified under the `AppError` enum, covering the
//! upload protocol, staging relocation, persistence, and job dispatch.

use std::io;

use sqlx::Error as SqlxError;
use uuid::Uuid;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like a failed dispatch
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error reporting - defines how an error should be classified.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "RANGE_CONFLICT")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown upload session: {0}")]
    UnknownSession(Uuid),

    #[error("Chunk range conflict: {0}")]
    RangeConflict(String),

    #[error("Upload incomplete: received {received} of {declared} declared bytes")]
    IncompleteUpload { received: u64, declared: u64 },

    #[error("Storage I/O error: {0}")]
    StorageIo(String),

    #[error("Persistence failed after {attempts} attempts")]
    PersistenceFailed { attempts: u32 },

    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

// Error conversion implementations
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::StorageIo(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidRequest(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (error_code, recoverable, log_level).
/// client_message stays per-variant for dynamic content.
fn app_error_static_metadata(err: &AppError) -> (&'static str, bool, LogLevel) {
    match err {
        AppError::Database(_) => ("DATABASE_ERROR", true, LogLevel::Error),
        AppError::InvalidRequest(_) => ("INVALID_REQUEST", false, LogLevel::Debug),
        AppError::UnknownSession(_) => ("UNKNOWN_SESSION", false, LogLevel::Debug),
        AppError::RangeConflict(_) => ("RANGE_CONFLICT", false, LogLevel::Debug),
        AppError::IncompleteUpload { .. } => ("INCOMPLETE_UPLOAD", false, LogLevel::Debug),
        AppError::StorageIo(_) => ("STORAGE_IO_ERROR", true, LogLevel::Error),
        AppError::PersistenceFailed { .. } => ("PERSISTENCE_FAILED", true, LogLevel::Error),
        AppError::DispatchFailed(_) => ("DISPATCH_FAILED", true, LogLevel::Warn),
        AppError::NotFound(_) => ("NOT_FOUND", false, LogLevel::Debug),
        AppError::Internal(_) => ("INTERNAL_ERROR", true, LogLevel::Error),
    }
}

impl ErrorMetadata for AppError {
    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).0
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).1
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).2
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::InvalidRequest(ref msg) => msg.clone(),
            AppError::UnknownSession(id) => format!("Unknown upload session: {}", id),
            AppError::RangeConflict(ref msg) => msg.clone(),
            AppError::IncompleteUpload { received, declared } => format!(
                "Upload incomplete: received {} of {} declared bytes",
                received, declared
            ),
            AppError::StorageIo(_) => "Failed to access storage".to_string(),
            AppError::PersistenceFailed { .. } => "Failed to record import request".to_string(),
            AppError::DispatchFailed(_) => {
                "Import recorded but processing not yet scheduled".to_string()
            }
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}
