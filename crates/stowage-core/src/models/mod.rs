//! Data models for the ingestion pipeline.
//!
//! Organized by domain: `import` holds the persisted import-request record,
//! `upload` the session-facing request and chunk types.

mod import;
mod upload;

// Re-export all models for convenient imports
pub use import::*;
pub use upload::*;
