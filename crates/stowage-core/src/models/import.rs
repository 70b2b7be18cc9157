use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle state of an import request.
///
/// This core only ever creates records in `Pending`; the remaining states
/// are owned and transitioned by the external archive-processing worker.
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "import_state", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum ImportState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ImportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportState::Completed | ImportState::Failed)
    }
}

impl Display for ImportState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ImportState::Pending => write!(f, "pending"),
            ImportState::Processing => write!(f, "processing"),
            ImportState::Completed => write!(f, "completed"),
            ImportState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ImportState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImportState::Pending),
            "processing" => Ok(ImportState::Processing),
            "completed" => Ok(ImportState::Completed),
            "failed" => Ok(ImportState::Failed),
            _ => Err(anyhow::anyhow!("Invalid import state: {}", s)),
        }
    }
}

/// One user-initiated archive import.
///
/// The originating upload session id is carried in the database row as the
/// idempotency key but is not part of this public shape.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImportRequest {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub state: ImportState,
    /// Owner-scoped relative path of the relocated archive. Derived from
    /// `(owner_id, id)` before the record is persisted; never reused.
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of finalizing a completed upload session.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub import: ImportRequest,
    /// True when this finalize call created the record; false when a
    /// duplicate completion signal resolved to an existing one.
    pub created: bool,
    /// True when the processing job was enqueued by this call. A persisted
    /// record with `dispatched = false` is picked up by reconciliation.
    pub dispatched: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_state_display() {
        assert_eq!(ImportState::Pending.to_string(), "pending");
        assert_eq!(ImportState::Processing.to_string(), "processing");
        assert_eq!(ImportState::Completed.to_string(), "completed");
        assert_eq!(ImportState::Failed.to_string(), "failed");
    }

    #[test]
    fn test_import_state_from_str() {
        assert_eq!(
            "pending".parse::<ImportState>().unwrap(),
            ImportState::Pending
        );
        assert_eq!(
            "processing".parse::<ImportState>().unwrap(),
            ImportState::Processing
        );
        assert_eq!(
            "completed".parse::<ImportState>().unwrap(),
            ImportState::Completed
        );
        assert_eq!("failed".parse::<ImportState>().unwrap(), ImportState::Failed);
        assert!("invalid_state".parse::<ImportState>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ImportState::Pending.is_terminal());
        assert!(!ImportState::Processing.is_terminal());
        assert!(ImportState::Completed.is_terminal());
        assert!(ImportState::Failed.is_terminal());
    }
}
