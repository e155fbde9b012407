//! Orchestration error taxonomy
//!
//! Every variant is fatal to the build in progress. Nothing is retried and
//! nothing already materialized is rolled back.

use revflow_cloud::{CloudError, JobType, RevisionId};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of the hash + pre-signed PUT sequence
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("upload rejected with HTTP status {status}")]
    Status { status: u16 },

    #[error("job {0} returned no pre-signed upload URL")]
    MissingSignedUrl(String),
}

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("asset #{index} is invalid: {source}")]
    InvalidSpec {
        index: usize,
        #[source]
        source: CloudError,
    },

    #[error("failed to submit {job_type} job: {source}")]
    Submission {
        job_type: JobType,
        #[source]
        source: CloudError,
    },

    #[error("upload failed: {0}")]
    Upload(#[from] UploadError),

    #[error("job {job_id} did not reach a terminal state within {timeout:?}")]
    PollTimeout { job_id: String, timeout: Duration },

    #[error("job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("job {job_id} was cancelled")]
    JobCancelled { job_id: String },

    #[error("missing new asset in revision {revision} after job {job_id}")]
    Reconciliation { revision: RevisionId, job_id: String },

    #[error(
        "job {job_id} produced {} new assets in revision {revision}: {}",
        .ids.len(),
        .ids.join(", ")
    )]
    AmbiguousAssets {
        revision: RevisionId,
        job_id: String,
        ids: Vec<String>,
    },

    #[error("revision {0} is finalized; deleting it requires force")]
    RevisionFinalized(RevisionId),

    #[error("{operation} timed out after {timeout:?}")]
    OperationTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    #[error("build of revision {revision} failed after {materialized} asset(s): {source}")]
    Build {
        revision: RevisionId,
        materialized: usize,
        #[source]
        source: Box<ExchangeError>,
    },

    #[error(transparent)]
    Api(#[from] CloudError),
}

impl ExchangeError {
    /// Revision left behind by a failed build
    pub fn revision(&self) -> Option<&RevisionId> {
        match self {
            ExchangeError::Build { revision, .. } => Some(revision),
            _ => None,
        }
    }

    /// The failure itself, looking through `Build`
    pub fn root(&self) -> &ExchangeError {
        match self {
            ExchangeError::Build { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
