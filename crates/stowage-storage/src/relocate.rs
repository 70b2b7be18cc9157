//! Atomic relocation of completed uploads into archive storage.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;

use crate::paths::resolve_under;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Relocation failed: {0}")]
    RelocateFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Moves completed uploads from the staging area into their final
/// owner-scoped location under the storage root.
#[derive(Clone)]
pub struct Relocator {
    storage_root: PathBuf,
}

impl Relocator {
    /// Create a new Relocator rooted at `storage_root`, creating the
    /// directory if needed.
    pub async fn new(storage_root: impl Into<PathBuf>) -> StorageResult<Self> {
        let storage_root = storage_root.into();

        fs::create_dir_all(&storage_root).await.map_err(|e| {
            StorageError::RelocateFailed(format!(
                "Failed to create storage root {}: {}",
                storage_root.display(),
                e
            ))
        })?;

        Ok(Relocator { storage_root })
    }

    /// Move `temp_path` to `storage_path` (relative to the storage root).
    ///
    /// Same-volume moves are a single atomic rename. Cross-volume moves fall
    /// back to copy + fsync into a `.partial` sibling, rename into place, and
    /// only then delete the original, so a crash at any point leaves either
    /// the source or a complete destination - never neither, and never a
    /// truncated file under the final name.
    ///
    /// A missing source with the destination already present is success: an
    /// earlier attempt moved it, and the finalize step is being retried.
    pub async fn relocate(&self, temp_path: &Path, storage_path: &str) -> StorageResult<PathBuf> {
        let dest = resolve_under(&self.storage_root, storage_path)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(temp_path).await.unwrap_or(false) {
            if fs::try_exists(&dest).await.unwrap_or(false) {
                tracing::debug!(
                    dest = %dest.display(),
                    "Staged file already relocated by an earlier attempt"
                );
                return Ok(dest);
            }
            return Err(StorageError::NotFound(temp_path.display().to_string()));
        }

        self.ensure_parent_dir(&dest).await?;

        match fs::rename(temp_path, &dest).await {
            Ok(()) => {}
            Err(e) if is_cross_device(&e) => {
                self.copy_across_volumes(temp_path, &dest).await?;
            }
            // A concurrent finalize for the same session can win the rename
            // between our existence check and here; the destination being in
            // place is all that matters.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !fs::try_exists(&dest).await.unwrap_or(false) {
                    return Err(StorageError::NotFound(temp_path.display().to_string()));
                }
                tracing::debug!(
                    dest = %dest.display(),
                    "Staged file relocated by a concurrent attempt"
                );
            }
            Err(e) => {
                return Err(StorageError::RelocateFailed(format!(
                    "Failed to move {} to {}: {}",
                    temp_path.display(),
                    dest.display(),
                    e
                )));
            }
        }

        tracing::info!(
            src = %temp_path.display(),
            dest = %dest.display(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Relocated staged upload"
        );

        Ok(dest)
    }

    /// Copy-then-delete fallback for moves that cross a filesystem boundary.
    async fn copy_across_volumes(&self, src: &Path, dest: &Path) -> StorageResult<()> {
        let file_name = dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::InvalidPath(dest.display().to_string()))?;
        let partial = dest.with_file_name(format!("{}.partial", file_name));

        let mut reader = fs::File::open(src).await.map_err(|e| {
            StorageError::RelocateFailed(format!("Failed to open {}: {}", src.display(), e))
        })?;
        let mut writer = fs::File::create(&partial).await.map_err(|e| {
            StorageError::RelocateFailed(format!("Failed to create {}: {}", partial.display(), e))
        })?;

        tokio::io::copy(&mut reader, &mut writer).await.map_err(|e| {
            StorageError::RelocateFailed(format!(
                "Failed to copy {} to {}: {}",
                src.display(),
                partial.display(),
                e
            ))
        })?;

        writer.sync_all().await.map_err(|e| {
            StorageError::RelocateFailed(format!("Failed to sync {}: {}", partial.display(), e))
        })?;
        drop(writer);

        fs::rename(&partial, dest).await.map_err(|e| {
            StorageError::RelocateFailed(format!(
                "Failed to rename {} to {}: {}",
                partial.display(),
                dest.display(),
                e
            ))
        })?;

        // The original goes last: until here a crash still leaves it intact.
        fs::remove_file(src).await.map_err(|e| {
            StorageError::RelocateFailed(format!("Failed to remove {}: {}", src.display(), e))
        })?;

        tracing::debug!(
            src = %src.display(),
            dest = %dest.display(),
            "Cross-volume relocation completed"
        );

        Ok(())
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::RelocateFailed(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}

/// EXDEV: rename across filesystem boundaries.
fn is_cross_device(err: &io::Error) -> bool {
    err.raw_os_error() == Some(18)
}
