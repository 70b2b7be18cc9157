//! Job enqueue seam and the Postgres-backed implementation.
//!
//! Enqueue deliberately stays outside the import-record transaction: when it
//! fails, the persisted record is left in place for external reconciliation
//! instead of being rolled back.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use stowage_core::AppError;

use crate::jobs::{JobPayload, JobType};

/// Channel name for PostgreSQL NOTIFY when a new job is enqueued.
pub const JOB_NOTIFY_CHANNEL: &str = "stowage_new_job";

/// Queue seam held by the ingestion pipeline.
///
/// Constructed once at process start and injected, so tests can substitute
/// a double and no global queue-client state exists.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue one job for at-least-once delivery to an external worker.
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
    ) -> Result<Uuid, AppError>;
}

/// Typed convenience over [`JobQueue::enqueue`].
pub async fn enqueue_job<P: JobPayload + Sync>(
    queue: &dyn JobQueue,
    payload: &P,
) -> Result<Uuid, AppError> {
    let value = serde_json::to_value(payload)
        .map_err(|e| AppError::Internal(format!("Failed to serialize job payload: {}", e)))?;
    queue.enqueue(P::job_type(), value).await
}

/// Postgres-backed queue: one row per job plus a NOTIFY so external workers
/// wake without waiting for their next poll.
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    #[tracing::instrument(skip(self, payload))]
    async fn enqueue(
        &self,
        job_type: JobType,
        payload: serde_json::Value,
    ) -> Result<Uuid, AppError> {
        let job_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(job_id)
        .bind(job_type.to_string())
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, job_type = %job_type, "Failed to enqueue job");
            AppError::DispatchFailed(format!("Failed to enqueue {}: {}", job_type, e))
        })?;

        // Wake workers immediately; polling still delivers if this fails.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(JOB_NOTIFY_CHANNEL)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await
        {
            tracing::warn!(error = %e, job_id = %job_id, "Job NOTIFY failed");
        }

        tracing::info!(job_id = %job_id, job_type = %job_type, "Job enqueued");

        Ok(job_id)
    }
}
