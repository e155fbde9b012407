//! Asset specifications and materialized assets

use crate::error::{CloudError, Result};
use crate::job::JobType;
use crate::revision::RevisionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Caller-declared intent to materialize one asset
///
/// Immutable once submitted: a changed spec means a replaced asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetSpec {
    /// Snapshot an object already in cloud storage
    ImportFromCloudStorage { bucket: String, key: String },

    /// Upload a local file through a pre-signed endpoint
    ImportFromSignedUpload { local_filename: PathBuf },

    /// Grant data access to a bucket (optionally narrowed to keys/prefixes)
    CreateDataAccessGrant {
        bucket: String,
        #[serde(default)]
        key_prefixes: Vec<String>,
        #[serde(default)]
        keys: Vec<String>,
        #[serde(default)]
        kms_keys_to_grant: Vec<String>,
    },
}

impl AssetSpec {
    pub fn import_from_cloud_storage(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        AssetSpec::ImportFromCloudStorage {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn import_from_signed_upload(local_filename: impl Into<PathBuf>) -> Self {
        AssetSpec::ImportFromSignedUpload {
            local_filename: local_filename.into(),
        }
    }

    pub fn data_access_grant(bucket: impl Into<String>) -> Self {
        AssetSpec::CreateDataAccessGrant {
            bucket: bucket.into(),
            key_prefixes: Vec::new(),
            keys: Vec::new(),
            kms_keys_to_grant: Vec::new(),
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            AssetSpec::ImportFromCloudStorage { .. } => JobType::ImportAssetsFromS3,
            AssetSpec::ImportFromSignedUpload { .. } => JobType::ImportAssetFromSignedUrl,
            AssetSpec::CreateDataAccessGrant { .. } => JobType::CreateS3DataAccessFromS3Bucket,
        }
    }

    /// Reject specs the backend would refuse anyway
    pub fn validate(&self) -> Result<()> {
        match self {
            AssetSpec::ImportFromCloudStorage { bucket, key } => {
                if bucket.is_empty() || key.is_empty() {
                    return Err(CloudError::Validation(
                        "cloud storage import needs both bucket and key".to_string(),
                    ));
                }
            }
            AssetSpec::ImportFromSignedUpload { local_filename } => {
                if local_filename.file_name().is_none() {
                    return Err(CloudError::Validation(format!(
                        "signed upload needs a file path, got '{}'",
                        local_filename.display()
                    )));
                }
            }
            AssetSpec::CreateDataAccessGrant {
                bucket,
                kms_keys_to_grant,
                ..
            } => {
                if bucket.is_empty() {
                    return Err(CloudError::Validation(
                        "data access grant needs a bucket".to_string(),
                    ));
                }
                if kms_keys_to_grant.iter().any(|k| k.is_empty()) {
                    return Err(CloudError::Validation(
                        "kms key ARNs must not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Type-specific details of a materialized asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetDetails {
    S3Snapshot {
        size: u64,
    },
    S3DataAccess {
        bucket: String,
        access_point_arn: String,
        access_point_alias: String,
        key_prefixes: Vec<String>,
        keys: Vec<String>,
        kms_keys_to_grant: Vec<String>,
    },
}

/// A materialized data object attached to a revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub revision: RevisionId,
    pub details: AssetDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An asset paired with the spec that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedAsset {
    pub spec: AssetSpec,
    pub asset: Asset,
}

impl MaterializedAsset {
    pub fn id(&self) -> &str {
        &self.asset.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_mapping() {
        assert_eq!(
            AssetSpec::import_from_cloud_storage("b", "k").job_type(),
            JobType::ImportAssetsFromS3
        );
        assert_eq!(
            AssetSpec::import_from_signed_upload("/tmp/data.csv").job_type(),
            JobType::ImportAssetFromSignedUrl
        );
        assert_eq!(
            AssetSpec::data_access_grant("b").job_type(),
            JobType::CreateS3DataAccessFromS3Bucket
        );
    }

    #[test]
    fn test_validate() {
        assert!(AssetSpec::import_from_cloud_storage("b", "k").validate().is_ok());
        assert!(AssetSpec::import_from_cloud_storage("", "k").validate().is_err());
        assert!(AssetSpec::import_from_signed_upload("..").validate().is_err());
        assert!(AssetSpec::data_access_grant("").validate().is_err());

        let spec = AssetSpec::CreateDataAccessGrant {
            bucket: "b".to_string(),
            key_prefixes: vec![],
            keys: vec![],
            kms_keys_to_grant: vec![String::new()],
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_spec_deserializes_with_defaults() {
        let spec: AssetSpec =
            serde_json::from_str(r#"{"kind":"create_data_access_grant","bucket":"b"}"#).unwrap();
        assert_eq!(spec, AssetSpec::data_access_grant("b"));
    }
}
