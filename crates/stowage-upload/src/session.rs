//! In-memory resumable upload sessions.
//!
//! Sessions are keyed by id and staged to `{staging_dir}/{session_id}.part`.
//! Chunks must arrive contiguously; an overlap is tolerated only when the
//! resent bytes are identical to what was already written. Different owners'
//! sessions proceed fully in parallel; operations within one session
//! serialize on a per-session mutex.

use std::collections::HashMap;
use std::io;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;
use validator::Validate;

use stowage_core::constants::PARTIAL_EXTENSION;
use stowage_core::models::{ArchiveMetadata, ByteRange, CompletedUpload, InitUploadRequest};
use stowage_core::AppError;

/// Identity assigned to a completed session by the first finalize attempt.
///
/// Retried and concurrent finalize attempts reuse the stored identity, so a
/// session maps to exactly one storage path no matter how often the final
/// acknowledgement is replayed.
#[derive(Debug, Clone)]
pub struct ImportIdentity {
    pub import_id: Uuid,
    pub storage_path: String,
}

#[derive(Debug)]
enum SessionPhase {
    Receiving,
    /// All declared bytes staged; completion is terminal for the session.
    Completed { identity: Option<ImportIdentity> },
}

struct Session {
    owner_id: Uuid,
    declared_size: u64,
    received: u64,
    metadata: ArchiveMetadata,
    temp_path: PathBuf,
    file: Option<File>,
    phase: SessionPhase,
    last_activity: Instant,
}

/// Tracks chunked uploads keyed by session id.
pub struct UploadSessionManager {
    staging_dir: PathBuf,
    max_archive_bytes: u64,
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
}

impl UploadSessionManager {
    /// Create a new manager, creating the staging directory if needed.
    pub async fn new(
        staging_dir: impl Into<PathBuf>,
        max_archive_bytes: u64,
    ) -> Result<Self, AppError> {
        let staging_dir = staging_dir.into();

        fs::create_dir_all(&staging_dir).await.map_err(|e| {
            AppError::StorageIo(format!(
                "Failed to create staging directory {}: {}",
                staging_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            staging_dir,
            max_archive_bytes,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Open a new upload session for `owner_id`.
    ///
    /// The declared size must be positive and within the configured maximum.
    pub async fn init_session(
        &self,
        owner_id: Uuid,
        request: InitUploadRequest,
    ) -> Result<Uuid, AppError> {
        request.validate()?;

        if request.declared_size > self.max_archive_bytes {
            return Err(AppError::InvalidRequest(format!(
                "Declared size {} exceeds maximum of {} bytes",
                request.declared_size, self.max_archive_bytes
            )));
        }

        let session_id = Uuid::new_v4();
        let temp_path = self.partial_path(session_id);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;

        let session = Session {
            owner_id,
            declared_size: request.declared_size,
            received: 0,
            metadata: request.metadata,
            temp_path,
            file: Some(file),
            phase: SessionPhase::Receiving,
            last_activity: Instant::now(),
        };

        self.sessions
            .write()
            .await
            .insert(session_id, Arc::new(Mutex::new(session)));

        tracing::info!(
            session_id = %session_id,
            owner_id = %owner_id,
            declared_size = request.declared_size,
            "Upload session opened"
        );

        Ok(session_id)
    }

    /// Append a chunk at `range`, returning the new received offset.
    ///
    /// The range must be contiguous with previously received bytes: a gap is
    /// a `RangeConflict`, and overlapping bytes are verified against what was
    /// already staged.
    pub async fn append_chunk(
        &self,
        session_id: Uuid,
        range: ByteRange,
        data: &[u8],
    ) -> Result<u64, AppError> {
        if range.is_empty() {
            return Err(AppError::InvalidRequest(
                "Chunk byte range is empty".to_string(),
            ));
        }
        if data.len() as u64 != range.len() {
            return Err(AppError::InvalidRequest(format!(
                "Chunk length {} does not match byte range length {}",
                data.len(),
                range.len()
            )));
        }

        let entry = self.get(session_id).await?;
        let mut sess = entry.lock().await;

        if !matches!(sess.phase, SessionPhase::Receiving) {
            return Err(AppError::InvalidRequest(
                "Upload session is already completed".to_string(),
            ));
        }
        if range.end > sess.declared_size {
            return Err(AppError::InvalidRequest(format!(
                "Byte range [{}, {}) exceeds declared size {}",
                range.start, range.end, sess.declared_size
            )));
        }
        if range.start > sess.received {
            return Err(AppError::RangeConflict(format!(
                "Gap before offset {}: only {} bytes received",
                range.start, sess.received
            )));
        }

        let received = sess.received;
        let overlap = (received - range.start).min(range.len()) as usize;
        let file = sess
            .file
            .as_mut()
            .ok_or_else(|| AppError::Internal("Staged file handle missing".to_string()))?;

        if overlap > 0 {
            let mut existing = vec![0u8; overlap];
            file.seek(SeekFrom::Start(range.start)).await?;
            file.read_exact(&mut existing).await?;
            if existing != data[..overlap] {
                return Err(AppError::RangeConflict(format!(
                    "Overlapping bytes at [{}, {}) differ from previously received data",
                    range.start,
                    range.start + overlap as u64
                )));
            }
        }

        if (overlap as u64) < range.len() {
            file.seek(SeekFrom::Start(received)).await?;
            file.write_all(&data[overlap..]).await?;
            sess.received = range.end;
        }
        sess.last_activity = Instant::now();

        tracing::debug!(
            session_id = %session_id,
            range_start = range.start,
            range_end = range.end,
            received = sess.received,
            "Chunk appended"
        );

        Ok(sess.received)
    }

    /// Release an abandoned session and its staged bytes.
    ///
    /// Idempotent: cancelling a missing session is not an error. Cancelling
    /// a completed session has no effect, since completion is terminal.
    pub async fn cancel_session(&self, session_id: Uuid) -> Result<(), AppError> {
        let entry = {
            let sessions = self.sessions.read().await;
            match sessions.get(&session_id) {
                Some(entry) => entry.clone(),
                None => return Ok(()),
            }
        };

        let temp_path = {
            let sess = entry.lock().await;
            if matches!(sess.phase, SessionPhase::Completed { .. }) {
                tracing::debug!(session_id = %session_id, "Cancel ignored: session already completed");
                return Ok(());
            }
            sess.temp_path.clone()
        };

        self.sessions.write().await.remove(&session_id);
        remove_staged_file(&temp_path, session_id).await;

        tracing::info!(session_id = %session_id, "Upload session cancelled");
        Ok(())
    }

    /// Complete a session once all declared bytes are staged.
    ///
    /// Flushes and syncs the staged file before handing it over. Idempotent:
    /// completing an already-completed session returns the same result, so a
    /// replayed final acknowledgement is harmless.
    pub async fn complete_session(&self, session_id: Uuid) -> Result<CompletedUpload, AppError> {
        let entry = self.get(session_id).await?;
        let mut sess = entry.lock().await;

        if matches!(sess.phase, SessionPhase::Receiving) {
            if sess.received != sess.declared_size {
                return Err(AppError::IncompleteUpload {
                    received: sess.received,
                    declared: sess.declared_size,
                });
            }

            if let Some(file) = sess.file.take() {
                file.sync_all().await?;
            }
            sess.phase = SessionPhase::Completed { identity: None };
            sess.last_activity = Instant::now();

            tracing::info!(
                session_id = %session_id,
                owner_id = %sess.owner_id,
                size = sess.declared_size,
                "Upload session completed"
            );
        }

        Ok(CompletedUpload {
            session_id,
            owner_id: sess.owner_id,
            temp_path: sess.temp_path.clone(),
            metadata: sess.metadata.clone(),
        })
    }

    /// Record the import identity on a completed session, first writer wins.
    ///
    /// Returns the stored identity, which may be an earlier attempt's
    /// `candidate` rather than the given one.
    pub async fn assign_identity(
        &self,
        session_id: Uuid,
        candidate: ImportIdentity,
    ) -> Result<ImportIdentity, AppError> {
        let entry = self.get(session_id).await?;
        let mut sess = entry.lock().await;

        match &mut sess.phase {
            SessionPhase::Receiving => Err(AppError::IncompleteUpload {
                received: sess.received,
                declared: sess.declared_size,
            }),
            SessionPhase::Completed { identity } => {
                let stored = identity.get_or_insert(candidate).clone();
                Ok(stored)
            }
        }
    }

    /// Drop a finalized session. Missing sessions are ignored; the staged
    /// file has already been relocated by the time this runs.
    pub async fn finish_session(&self, session_id: Uuid) {
        if self.sessions.write().await.remove(&session_id).is_some() {
            tracing::debug!(session_id = %session_id, "Upload session finished");
        }
    }

    /// Bytes received so far for a session.
    pub async fn received_bytes(&self, session_id: Uuid) -> Result<u64, AppError> {
        let entry = self.get(session_id).await?;
        let sess = entry.lock().await;
        Ok(sess.received)
    }

    /// Reclaim sessions with no activity for longer than `idle_timeout`,
    /// deleting their staged partial files. Returns the reclaimed count.
    ///
    /// Sessions busy in another operation are skipped this round.
    pub async fn sweep_idle(&self, idle_timeout: Duration) -> usize {
        let now = Instant::now();
        let mut stale: Vec<(Uuid, PathBuf)> = Vec::new();

        {
            let mut sessions = self.sessions.write().await;
            sessions.retain(|id, entry| match entry.try_lock() {
                Ok(sess) => {
                    if now.duration_since(sess.last_activity) >= idle_timeout {
                        stale.push((*id, sess.temp_path.clone()));
                        false
                    } else {
                        true
                    }
                }
                Err(_) => true,
            });
        }

        for (session_id, temp_path) in &stale {
            remove_staged_file(temp_path, *session_id).await;
            tracing::info!(session_id = %session_id, "Reclaimed idle upload session");
        }

        stale.len()
    }

    async fn get(&self, session_id: Uuid) -> Result<Arc<Mutex<Session>>, AppError> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(AppError::UnknownSession(session_id))
    }

    fn partial_path(&self, session_id: Uuid) -> PathBuf {
        self.staging_dir
            .join(format!("{}.{}", session_id, PARTIAL_EXTENSION))
    }
}

async fn remove_staged_file(temp_path: &Path, session_id: Uuid) {
    if let Err(e) = fs::remove_file(temp_path).await {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(
                error = %e,
                session_id = %session_id,
                path = %temp_path.display(),
                "Failed to delete staged partial file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MAX_BYTES: u64 = 1024 * 1024;

    async fn manager(dir: &Path) -> UploadSessionManager {
        UploadSessionManager::new(dir, MAX_BYTES).await.unwrap()
    }

    fn init_request(declared_size: u64) -> InitUploadRequest {
        InitUploadRequest {
            declared_size,
            metadata: ArchiveMetadata {
                filename: Some("backup.zip".to_string()),
                content_type: Some("application/zip".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn test_init_rejects_zero_and_oversize() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let owner = Uuid::new_v4();

        let zero = mgr.init_session(owner, init_request(0)).await;
        assert!(matches!(zero, Err(AppError::InvalidRequest(_))));

        let oversize = mgr.init_session(owner, init_request(MAX_BYTES + 1)).await;
        assert!(matches!(oversize, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_contiguous_chunks_then_complete() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let owner = Uuid::new_v4();

        let id = mgr.init_session(owner, init_request(1024)).await.unwrap();

        let first = vec![1u8; 512];
        let second = vec![2u8; 512];
        assert_eq!(
            mgr.append_chunk(id, ByteRange::new(0, 512), &first)
                .await
                .unwrap(),
            512
        );
        assert_eq!(
            mgr.append_chunk(id, ByteRange::new(512, 1024), &second)
                .await
                .unwrap(),
            1024
        );

        let completed = mgr.complete_session(id).await.unwrap();
        assert_eq!(completed.owner_id, owner);
        assert_eq!(completed.metadata.filename.as_deref(), Some("backup.zip"));

        let staged = fs::read(&completed.temp_path).await.unwrap();
        assert_eq!(&staged[..512], &first[..]);
        assert_eq!(&staged[512..], &second[..]);
    }

    #[tokio::test]
    async fn test_gap_is_range_conflict_and_state_unchanged() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(1024))
            .await
            .unwrap();

        mgr.append_chunk(id, ByteRange::new(0, 512), &[7u8; 512])
            .await
            .unwrap();

        let result = mgr
            .append_chunk(id, ByteRange::new(600, 700), &[9u8; 100])
            .await;
        assert!(matches!(result, Err(AppError::RangeConflict(_))));

        // Session unaffected by the rejected chunk
        assert_eq!(mgr.received_bytes(id).await.unwrap(), 512);
        assert_eq!(
            mgr.append_chunk(id, ByteRange::new(512, 1024), &[8u8; 512])
                .await
                .unwrap(),
            1024
        );
    }

    #[tokio::test]
    async fn test_identical_overlap_accepted() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(768))
            .await
            .unwrap();

        mgr.append_chunk(id, ByteRange::new(0, 512), &[5u8; 512])
            .await
            .unwrap();

        // Client retransmits [256, 768) after a network blip; the first half
        // overlaps what we already staged.
        let mut resend = vec![5u8; 256];
        resend.extend_from_slice(&[6u8; 256]);
        let offset = mgr
            .append_chunk(id, ByteRange::new(256, 768), &resend)
            .await
            .unwrap();
        assert_eq!(offset, 768);

        let completed = mgr.complete_session(id).await.unwrap();
        let staged = fs::read(&completed.temp_path).await.unwrap();
        assert_eq!(&staged[..512], &[5u8; 512][..]);
        assert_eq!(&staged[512..], &[6u8; 256][..]);
    }

    #[tokio::test]
    async fn test_divergent_overlap_is_range_conflict() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(1024))
            .await
            .unwrap();

        mgr.append_chunk(id, ByteRange::new(0, 512), &[5u8; 512])
            .await
            .unwrap();

        let result = mgr
            .append_chunk(id, ByteRange::new(256, 512), &[9u8; 256])
            .await;
        assert!(matches!(result, Err(AppError::RangeConflict(_))));
        assert_eq!(mgr.received_bytes(id).await.unwrap(), 512);
    }

    #[tokio::test]
    async fn test_fully_duplicate_chunk_is_noop() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(1024))
            .await
            .unwrap();

        mgr.append_chunk(id, ByteRange::new(0, 512), &[5u8; 512])
            .await
            .unwrap();
        let offset = mgr
            .append_chunk(id, ByteRange::new(0, 512), &[5u8; 512])
            .await
            .unwrap();
        assert_eq!(offset, 512);
    }

    #[tokio::test]
    async fn test_complete_before_all_bytes_is_incomplete() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(1024))
            .await
            .unwrap();

        mgr.append_chunk(id, ByteRange::new(0, 512), &[5u8; 512])
            .await
            .unwrap();

        let result = mgr.complete_session(id).await;
        assert!(matches!(
            result,
            Err(AppError::IncompleteUpload {
                received: 512,
                declared: 1024
            })
        ));
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(16))
            .await
            .unwrap();
        mgr.append_chunk(id, ByteRange::new(0, 16), &[1u8; 16])
            .await
            .unwrap();

        let first = mgr.complete_session(id).await.unwrap();
        let second = mgr.complete_session(id).await.unwrap();
        assert_eq!(first.temp_path, second.temp_path);
        assert_eq!(first.owner_id, second.owner_id);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_releases_staged_file() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(64))
            .await
            .unwrap();
        mgr.append_chunk(id, ByteRange::new(0, 32), &[1u8; 32])
            .await
            .unwrap();

        mgr.cancel_session(id).await.unwrap();
        mgr.cancel_session(id).await.unwrap();

        assert!(matches!(
            mgr.append_chunk(id, ByteRange::new(32, 64), &[1u8; 32])
                .await,
            Err(AppError::UnknownSession(_))
        ));
        let staged = dir.path().join(format!("{}.part", id));
        assert!(!fs::try_exists(&staged).await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_after_completion_has_no_effect() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(16))
            .await
            .unwrap();
        mgr.append_chunk(id, ByteRange::new(0, 16), &[1u8; 16])
            .await
            .unwrap();
        mgr.complete_session(id).await.unwrap();

        mgr.cancel_session(id).await.unwrap();

        // Session and staged file survive the cancel
        let completed = mgr.complete_session(id).await.unwrap();
        assert!(fs::try_exists(&completed.temp_path).await.unwrap());
    }

    #[tokio::test]
    async fn test_assign_identity_first_wins() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(16))
            .await
            .unwrap();
        mgr.append_chunk(id, ByteRange::new(0, 16), &[1u8; 16])
            .await
            .unwrap();
        mgr.complete_session(id).await.unwrap();

        let first = mgr
            .assign_identity(
                id,
                ImportIdentity {
                    import_id: Uuid::new_v4(),
                    storage_path: "imports/a/first.zip".to_string(),
                },
            )
            .await
            .unwrap();
        let second = mgr
            .assign_identity(
                id,
                ImportIdentity {
                    import_id: Uuid::new_v4(),
                    storage_path: "imports/a/second.zip".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(first.import_id, second.import_id);
        assert_eq!(second.storage_path, "imports/a/first.zip");
    }

    #[tokio::test]
    async fn test_assign_identity_requires_completion() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;
        let id = mgr
            .init_session(Uuid::new_v4(), init_request(16))
            .await
            .unwrap();

        let result = mgr
            .assign_identity(
                id,
                ImportIdentity {
                    import_id: Uuid::new_v4(),
                    storage_path: "imports/a/x.zip".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::IncompleteUpload { .. })));
    }

    #[tokio::test]
    async fn test_sweep_reclaims_only_idle_sessions() {
        let dir = tempdir().unwrap();
        let mgr = manager(dir.path()).await;

        let a = mgr
            .init_session(Uuid::new_v4(), init_request(64))
            .await
            .unwrap();
        let b = mgr
            .init_session(Uuid::new_v4(), init_request(64))
            .await
            .unwrap();

        // Nothing is older than an hour
        assert_eq!(mgr.sweep_idle(Duration::from_secs(3600)).await, 0);
        assert!(mgr.received_bytes(a).await.is_ok());

        // With a zero timeout everything is idle
        assert_eq!(mgr.sweep_idle(Duration::ZERO).await, 2);
        assert!(matches!(
            mgr.received_bytes(a).await,
            Err(AppError::UnknownSession(_))
        ));
        assert!(matches!(
            mgr.received_bytes(b).await,
            Err(AppError::UnknownSession(_))
        ));
        let staged = dir.path().join(format!("{}.part", a));
        assert!(!fs::try_exists(&staged).await.unwrap());
    }
}
