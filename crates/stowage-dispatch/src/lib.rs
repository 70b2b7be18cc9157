//! Stowage Dispatch Library
//!
//! The job-queue seam the ingestion pipeline hands work off through, plus
//! the Postgres-backed implementation. Only the enqueue side lives here;
//! claiming and running jobs belongs to the external processing workers.

pub mod jobs;
pub mod queue;

// Re-export commonly used types
pub use jobs::{ImportArchivePayload, JobPayload, JobType};
pub use queue::{enqueue_job, JobQueue, PgJobQueue, JOB_NOTIFY_CHANNEL};
