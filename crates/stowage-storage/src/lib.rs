//! Stowage Storage Library
//!
//! Archive path layout and atomic relocation of completed uploads from the
//! staging area into owner-scoped storage.
//!
//! # Path format
//!
//! Relocated archives are owner-scoped: `imports/{owner_id}/{import_id}.zip`.
//! Paths must not contain `..` or a leading `/`; derivation is centralized in
//! the `paths` module and a given path is never reused for a second record.

pub mod paths;
pub mod relocate;

// Re-export commonly used types
pub use paths::import_archive_path;
pub use relocate::{Relocator, StorageError, StorageResult};
