//! Stowage Upload Library
//!
//! In-memory resumable upload sessions and the background sweeper that
//! reclaims idle ones. Sessions stage incoming chunks to a partial file
//! under the configured staging directory; completion hands the staged file
//! to the ingestion pipeline.

pub mod session;
pub mod sweep;

// Re-export commonly used types
pub use session::{ImportIdentity, UploadSessionManager};
pub use sweep::SessionSweeper;
