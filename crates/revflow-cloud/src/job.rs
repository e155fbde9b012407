//! Background job types
//!
//! A job is the backend's asynchronous unit of work that materializes one
//! asset from one [`AssetSpec`](crate::AssetSpec).

use crate::revision::RevisionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job lifecycle state
///
/// `Waiting -> InProgress -> {Completed, Error, Cancelled}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Waiting,
    InProgress,
    Completed,
    Error,
    Cancelled,
}

impl JobState {
    /// No further transitions happen from a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Waiting => write!(f, "WAITING"),
            JobState::InProgress => write!(f, "IN_PROGRESS"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Error => write!(f, "ERROR"),
            JobState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Job type, mirroring the asset spec variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "IMPORT_ASSETS_FROM_S3")]
    ImportAssetsFromS3,
    #[serde(rename = "IMPORT_ASSET_FROM_SIGNED_URL")]
    ImportAssetFromSignedUrl,
    #[serde(rename = "CREATE_S3_DATA_ACCESS_FROM_S3_BUCKET")]
    CreateS3DataAccessFromS3Bucket,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobType::ImportAssetsFromS3 => write!(f, "IMPORT_ASSETS_FROM_S3"),
            JobType::ImportAssetFromSignedUrl => write!(f, "IMPORT_ASSET_FROM_SIGNED_URL"),
            JobType::CreateS3DataAccessFromS3Bucket => {
                write!(f, "CREATE_S3_DATA_ACCESS_FROM_S3_BUCKET")
            }
        }
    }
}

/// Type-specific job request details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobDetails {
    ImportAssetsFromS3 {
        bucket: String,
        key: String,
    },
    ImportAssetFromSignedUrl {
        asset_name: String,
        /// Base64-encoded MD5 of the content that will be uploaded
        md5_hash: String,
    },
    CreateS3DataAccessFromS3Bucket {
        bucket: String,
        key_prefixes: Vec<String>,
        keys: Vec<String>,
        kms_keys_to_grant: Vec<String>,
    },
}

impl JobDetails {
    pub fn job_type(&self) -> JobType {
        match self {
            JobDetails::ImportAssetsFromS3 { .. } => JobType::ImportAssetsFromS3,
            JobDetails::ImportAssetFromSignedUrl { .. } => JobType::ImportAssetFromSignedUrl,
            JobDetails::CreateS3DataAccessFromS3Bucket { .. } => {
                JobType::CreateS3DataAccessFromS3Bucket
            }
        }
    }
}

/// A create-job request targeting one revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub revision: RevisionId,
    pub details: JobDetails,
}

/// Pre-signed endpoint returned for signed-URL imports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUpload {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Response of a create-job call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedJob {
    pub id: String,
    pub job_type: JobType,
    pub state: JobState,
    pub signed_upload: Option<SignedUpload>,
}

/// One cause attached to a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Status snapshot returned by a get-job call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: String,
    pub job_type: JobType,
    pub state: JobState,
    /// Non-empty only when `state` is `Error`
    pub errors: Vec<JobError>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Waiting.is_terminal());
        assert!(!JobState::InProgress.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Error.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_state_wire_names() {
        let json = serde_json::to_string(&JobState::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let state: JobState = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(state, JobState::Cancelled);
    }

    #[test]
    fn test_job_error_display() {
        assert_eq!(JobError::new("A", "m1").to_string(), "A: m1");
    }

    #[test]
    fn test_details_job_type() {
        let details = JobDetails::ImportAssetFromSignedUrl {
            asset_name: "data.csv".to_string(),
            md5_hash: "abc".to_string(),
        };
        assert_eq!(details.job_type(), JobType::ImportAssetFromSignedUrl);
        assert_eq!(
            details.job_type().to_string(),
            "IMPORT_ASSET_FROM_SIGNED_URL"
        );
    }
}
