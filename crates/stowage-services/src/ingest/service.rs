use std::sync::Arc;

use uuid::Uuid;

use stowage_core::models::ImportOutcome;
use stowage_core::AppError;
use stowage_db::{ImportStore, NewImportRequest};
use stowage_dispatch::{enqueue_job, ImportArchivePayload, JobQueue};
use stowage_storage::{import_archive_path, Relocator};
use stowage_upload::{ImportIdentity, UploadSessionManager};

/// Orchestrates the ingestion handoff: a completed upload session becomes a
/// relocated archive, a persisted pending record, and a dispatched
/// processing job, in that order.
#[derive(Clone)]
pub struct IngestService {
    sessions: Arc<UploadSessionManager>,
    relocator: Relocator,
    store: Arc<dyn ImportStore>,
    queue: Arc<dyn JobQueue>,
}

impl IngestService {
    pub fn new(
        sessions: Arc<UploadSessionManager>,
        relocator: Relocator,
        store: Arc<dyn ImportStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            sessions,
            relocator,
            store,
            queue,
        }
    }

    /// Finalize a completed upload session into an import request.
    ///
    /// Safe to retry and safe under concurrent duplicates: the upload
    /// session id is the idempotency key, enforced by the store's uniqueness
    /// constraint, so every caller observes the same record and exactly one
    /// dispatch occurs. A relocation failure leaves the session completed
    /// but not relocated, and a later retry picks up from there without
    /// re-uploading any bytes.
    #[tracing::instrument(skip(self))]
    pub async fn finalize_import(&self, session_id: Uuid) -> Result<ImportOutcome, AppError> {
        // A replayed completion signal may arrive after the session itself
        // was released; the stored record still answers it.
        if let Some(outcome) = self.existing_outcome(session_id).await? {
            return Ok(outcome);
        }

        let completed = match self.sessions.complete_session(session_id).await {
            // A concurrent finalize can run to the end and release the
            // session while we were between the pre-check and here.
            Err(AppError::UnknownSession(id)) => {
                return match self.existing_outcome(session_id).await? {
                    Some(outcome) => Ok(outcome),
                    None => Err(AppError::UnknownSession(id)),
                };
            }
            other => other?,
        };

        // First attempt picks the identity; retries and concurrent
        // duplicates reuse it, so the storage path is stable per session.
        let candidate_id = Uuid::new_v4();
        let identity = match self
            .sessions
            .assign_identity(
                session_id,
                ImportIdentity {
                    import_id: candidate_id,
                    storage_path: import_archive_path(completed.owner_id, candidate_id),
                },
            )
            .await
        {
            Err(AppError::UnknownSession(id)) => {
                return match self.existing_outcome(session_id).await? {
                    Some(outcome) => Ok(outcome),
                    None => Err(AppError::UnknownSession(id)),
                };
            }
            other => other?,
        };

        self.relocator
            .relocate(&completed.temp_path, &identity.storage_path)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    owner_id = %completed.owner_id,
                    "Relocation failed; session kept for a finalize retry"
                );
                AppError::StorageIo(e.to_string())
            })?;

        let (import, created) = self
            .store
            .create_pending(NewImportRequest {
                import_id: identity.import_id,
                owner_id: completed.owner_id,
                upload_session_id: session_id,
                storage_path: identity.storage_path,
            })
            .await?;

        let mut dispatched = false;
        if created {
            let payload = ImportArchivePayload {
                import_request_id: import.id,
            };
            match enqueue_job(self.queue.as_ref(), &payload).await {
                Ok(job_id) => {
                    dispatched = true;
                    tracing::info!(
                        import_id = %import.id,
                        job_id = %job_id,
                        owner_id = %import.owner_id,
                        filename = ?completed.metadata.filename,
                        "Import request created and processing job dispatched"
                    );
                }
                Err(e) => {
                    // The record stays put; reconciliation re-dispatches
                    // pending-but-never-enqueued imports.
                    tracing::warn!(
                        import_id = %import.id,
                        error = %e,
                        "Import persisted but dispatch failed"
                    );
                }
            }
        }

        self.sessions.finish_session(session_id).await;

        Ok(ImportOutcome {
            import,
            created,
            dispatched,
        })
    }

    /// The already-finalized answer for a session, when its record exists.
    async fn existing_outcome(
        &self,
        session_id: Uuid,
    ) -> Result<Option<ImportOutcome>, AppError> {
        let existing = self.store.find_by_session(session_id).await?;
        Ok(existing.map(|import| {
            tracing::info!(
                import_id = %import.id,
                "Import already recorded for session"
            );
            ImportOutcome {
                import,
                created: false,
                dispatched: false,
            }
        }))
    }
}
