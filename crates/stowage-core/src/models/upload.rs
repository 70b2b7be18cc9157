use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;
use validator::Validate;

/// Client-declared metadata accompanying an upload session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveMetadata {
    /// Original filename as the client named it
    #[serde(default)]
    pub filename: Option<String>,
    /// Content type (MIME type)
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Request to open a resumable upload session
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitUploadRequest {
    /// Total archive size in bytes the client intends to send
    #[validate(range(min = 1, message = "Declared size must be at least 1 byte"))]
    pub declared_size: u64,
    #[serde(default)]
    pub metadata: ArchiveMetadata,
}

/// Half-open byte range `[start, end)` of an incoming chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A fully received upload, ready for relocation and persistence.
///
/// Returned by session completion; idempotent, so retried finalize attempts
/// observe the same staged file and metadata.
#[derive(Debug, Clone)]
pub struct CompletedUpload {
    pub session_id: Uuid,
    pub owner_id: Uuid,
    /// Staged file holding all declared bytes, flushed and synced
    pub temp_path: PathBuf,
    pub metadata: ArchiveMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_range_len() {
        assert_eq!(ByteRange::new(0, 512).len(), 512);
        assert_eq!(ByteRange::new(512, 1024).len(), 512);
        assert_eq!(ByteRange::new(10, 10).len(), 0);
        assert!(ByteRange::new(10, 10).is_empty());
        assert!(!ByteRange::new(0, 1).is_empty());
    }

    #[test]
    fn test_init_request_validation() {
        let ok = InitUploadRequest {
            declared_size: 1024,
            metadata: ArchiveMetadata::default(),
        };
        assert!(ok.validate().is_ok());

        let zero = InitUploadRequest {
            declared_size: 0,
            metadata: ArchiveMetadata::default(),
        };
        assert!(zero.validate().is_err());
    }
}
