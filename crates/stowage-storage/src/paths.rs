//! Deterministic path layout for stored import archives.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::relocate::{StorageError, StorageResult};
use stowage_core::constants::ARCHIVE_EXTENSION;

/// Owner-scoped relative path for an import archive.
///
/// Derived from the record identity before persistence so relocation and
/// the database write can be ordered independently.
pub fn import_archive_path(owner_id: Uuid, import_id: Uuid) -> String {
    format!("imports/{}/{}.{}", owner_id, import_id, ARCHIVE_EXTENSION)
}

/// Resolve a relative storage path under `base`, rejecting traversal.
pub fn resolve_under(base: &Path, relative: &str) -> StorageResult<PathBuf> {
    if relative.contains("..") || relative.starts_with('/') {
        return Err(StorageError::InvalidPath(
            "Storage path contains invalid characters".to_string(),
        ));
    }

    Ok(base.join(relative))
}
