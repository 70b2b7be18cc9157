use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use stowage_core::models::ImportRequest;
use stowage_core::AppError;

use crate::db::retry::{with_write_retries, WriteRetryPolicy};

/// Store seam for import records.
///
/// Services hold this trait rather than the concrete repository so tests can
/// substitute an in-memory implementation.
#[async_trait]
pub trait ImportStore: Send + Sync {
    /// Persist the pending record for a completed upload session, or return
    /// the existing one when the session was already finalized.
    ///
    /// The returned bool is true when this call created the record.
    async fn create_pending(
        &self,
        new: NewImportRequest,
    ) -> Result<(ImportRequest, bool), AppError>;

    /// Look up the record created for an upload session, if any.
    async fn find_by_session(&self, session_id: Uuid) -> Result<Option<ImportRequest>, AppError>;

    /// The owner's most recent import by `created_at`, or None.
    async fn load_latest_by_owner(&self, owner_id: Uuid)
        -> Result<Option<ImportRequest>, AppError>;
}

/// Parameters for creating a pending import record.
///
/// The upload session id is the idempotency key; it lives in the row but not
/// in the public `ImportRequest` shape.
#[derive(Debug, Clone)]
pub struct NewImportRequest {
    pub import_id: Uuid,
    pub owner_id: Uuid,
    pub upload_session_id: Uuid,
    pub storage_path: String,
}

/// Repository for import request records
#[derive(Clone)]
pub struct ImportRequestRepository {
    pool: PgPool,
    retry: WriteRetryPolicy,
}

impl ImportRequestRepository {
    pub fn new(pool: PgPool, retry: WriteRetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// One attempt of the create transaction. The uniqueness constraint on
    /// `upload_session_id` collapses duplicate completion signals: a
    /// suppressed insert means another finalize already won, and we hand back
    /// its record instead of erroring.
    async fn try_create_pending(
        &self,
        new: &NewImportRequest,
    ) -> Result<(ImportRequest, bool), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, ImportRequest>(
            r#"
            INSERT INTO import_requests (id, owner_id, upload_session_id, state, storage_path)
            VALUES ($1, $2, $3, 'pending', $4)
            ON CONFLICT (upload_session_id) DO NOTHING
            RETURNING id, owner_id, state, storage_path, created_at, updated_at
            "#,
        )
        .bind(new.import_id)
        .bind(new.owner_id)
        .bind(new.upload_session_id)
        .bind(&new.storage_path)
        .fetch_optional(&mut *tx)
        .await?;

        let result = match inserted {
            Some(row) => (row, true),
            None => {
                let existing = sqlx::query_as::<_, ImportRequest>(
                    r#"
                    SELECT id, owner_id, state, storage_path, created_at, updated_at
                    FROM import_requests
                    WHERE upload_session_id = $1
                    "#,
                )
                .bind(new.upload_session_id)
                .fetch_one(&mut *tx)
                .await?;
                (existing, false)
            }
        };

        tx.commit().await?;
        Ok(result)
    }
}

#[async_trait]
impl ImportStore for ImportRequestRepository {
    async fn create_pending(
        &self,
        new: NewImportRequest,
    ) -> Result<(ImportRequest, bool), AppError> {
        let (import, created) =
            with_write_retries(&self.retry, || self.try_create_pending(&new)).await?;

        if created {
            tracing::info!(
                import_id = %import.id,
                owner_id = %import.owner_id,
                storage_path = %import.storage_path,
                "Import request persisted"
            );
        } else {
            tracing::info!(
                import_id = %import.id,
                upload_session_id = %new.upload_session_id,
                "Duplicate completion resolved to existing import request"
            );
        }

        Ok((import, created))
    }

    async fn find_by_session(&self, session_id: Uuid) -> Result<Option<ImportRequest>, AppError> {
        let row = sqlx::query_as::<_, ImportRequest>(
            r#"
            SELECT id, owner_id, state, storage_path, created_at, updated_at
            FROM import_requests
            WHERE upload_session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn load_latest_by_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Option<ImportRequest>, AppError> {
        let row = sqlx::query_as::<_, ImportRequest>(
            r#"
            SELECT id, owner_id, state, storage_path, created_at, updated_at
            FROM import_requests
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
