//! Write-retry helpers for transactions that can hit transient conflicts.
//!
//! Concurrent finalize calls racing for the same owner may trip Postgres
//! serialization failures; the whole transaction is retried with bounded
//! exponential backoff before the failure is surfaced.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use stowage_core::AppError;

/// Maximum delay in milliseconds between write retries. Caps exponential
/// backoff so that high attempt counts do not produce excessive delays.
pub const MAX_WRITE_BACKOFF_MS: u64 = 2_000;

// Postgres SQLSTATEs for transient write conflicts
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Computes backoff in milliseconds for a given attempt (exponential with cap).
#[inline]
pub(crate) fn compute_write_backoff_ms(attempt: u32, base_ms: u64) -> u64 {
    base_ms
        .saturating_mul(2_u64.saturating_pow(attempt))
        .min(MAX_WRITE_BACKOFF_MS)
}

/// Whether an error is a transient conflict worth retrying.
pub fn is_transient_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(
            db.code().as_deref(),
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
        ),
        _ => false,
    }
}

/// Retry policy for transactional writes.
#[derive(Debug, Clone)]
pub struct WriteRetryPolicy {
    /// Total attempts before giving up, including the first.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
}

impl Default for WriteRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_base_ms: 50,
        }
    }
}

/// Run `op` until it succeeds, fails non-transiently, or exhausts the policy.
///
/// Transient conflicts surface as `PersistenceFailed` once retries run out;
/// every other database error is returned as-is on the first occurrence.
pub async fn with_write_retries<T, F, Fut>(
    policy: &WriteRetryPolicy,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient_conflict(&e) => {
                if attempt >= policy.max_attempts.max(1) {
                    tracing::error!(
                        attempts = attempt,
                        error = %e,
                        "Transactional write retries exhausted"
                    );
                    return Err(AppError::PersistenceFailed { attempts: attempt });
                }
                let backoff_ms = compute_write_backoff_ms(attempt - 1, policy.backoff_base_ms);
                tracing::warn!(
                    attempt,
                    backoff_ms,
                    error = %e,
                    "Transient write conflict, retrying transaction"
                );
                sleep(Duration::from_millis(backoff_ms)).await;
            }
            Err(e) => return Err(AppError::Database(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_backoff_exponential_then_capped() {
        assert_eq!(compute_write_backoff_ms(0, 50), 50);
        assert_eq!(compute_write_backoff_ms(1, 50), 100);
        assert_eq!(compute_write_backoff_ms(2, 50), 200);
        assert_eq!(compute_write_backoff_ms(5, 50), 1600);
        assert_eq!(compute_write_backoff_ms(6, 50), MAX_WRITE_BACKOFF_MS);
        assert_eq!(compute_write_backoff_ms(30, 50), MAX_WRITE_BACKOFF_MS);
    }

    #[test]
    fn non_database_errors_are_not_transient() {
        assert!(!is_transient_conflict(&sqlx::Error::PoolClosed));
        assert!(!is_transient_conflict(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let policy = WriteRetryPolicy::default();
        let mut calls = 0u32;
        let result: Result<(), AppError> = with_write_retries(&policy, || {
            calls += 1;
            async { Err(sqlx::Error::PoolClosed) }
        })
        .await;

        assert!(matches!(result, Err(AppError::Database(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn success_passes_through() {
        let policy = WriteRetryPolicy::default();
        let result = with_write_retries(&policy, || async { Ok::<_, sqlx::Error>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
