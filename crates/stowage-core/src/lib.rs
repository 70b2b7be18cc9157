//! Stowage Core Library
//!
//! This crate provides the domain models, error types, configuration, and
//! telemetry setup shared across all stowage components.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
