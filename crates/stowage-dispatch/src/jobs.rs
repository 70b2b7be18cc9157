//! Job types and payloads handed to the external processing workers.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    ImportArchiveProcessing,
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobType::ImportArchiveProcessing => write!(f, "import-archive-processing"),
        }
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "import-archive-processing" => Ok(JobType::ImportArchiveProcessing),
            _ => Err(anyhow::anyhow!("Invalid job type: {}", s)),
        }
    }
}

/// Trait for type-safe job payloads
pub trait JobPayload: Serialize + for<'de> Deserialize<'de> {
    fn job_type() -> JobType;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportArchivePayload {
    pub import_request_id: Uuid,
}

impl JobPayload for ImportArchivePayload {
    fn job_type() -> JobType {
        JobType::ImportArchiveProcessing
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_display() {
        assert_eq!(
            JobType::ImportArchiveProcessing.to_string(),
            "import-archive-processing"
        );
    }

    #[test]
    fn test_job_type_from_str() {
        assert_eq!(
            "import-archive-processing".parse::<JobType>().unwrap(),
            JobType::ImportArchiveProcessing
        );
        assert!("unknown-job".parse::<JobType>().is_err());
    }

    #[test]
    fn test_import_archive_payload_job_type() {
        assert_eq!(
            ImportArchivePayload::job_type(),
            JobType::ImportArchiveProcessing
        );
    }

    #[test]
    fn test_payload_serialization_shape() {
        let id = Uuid::new_v4();
        let payload = ImportArchivePayload {
            import_request_id: id,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["import_request_id"], id.to_string());
    }
}
