//! Remote data exchange API abstraction

use crate::asset::Asset;
use crate::error::Result;
use crate::job::{CreatedJob, JobRequest, JobSnapshot};
use crate::revision::{CreateRevision, Revision, RevisionId, RevisionUpdate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Entity-management API the orchestration engine drives
///
/// Authentication, retries of individual calls and rate limiting are the
/// implementation's concern; the engine treats every error as fatal.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Create a new revision in a data set
    async fn create_revision(&self, input: &CreateRevision) -> Result<Revision>;

    /// Fetch a revision; `CloudError::RevisionNotFound` when it is gone
    async fn get_revision(&self, id: &RevisionId) -> Result<Revision>;

    /// Apply a partial update (comment, finalized)
    async fn update_revision(&self, id: &RevisionId, update: &RevisionUpdate) -> Result<Revision>;

    /// Delete a revision and its assets
    async fn delete_revision(&self, id: &RevisionId) -> Result<()>;

    /// Create (but do not start) a background job
    async fn create_job(&self, request: &JobRequest) -> Result<CreatedJob>;

    /// Start a previously created job
    async fn start_job(&self, job_id: &str) -> Result<()>;

    /// Current status of a job
    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot>;

    /// One page of the assets attached to a revision
    async fn list_revision_assets(
        &self,
        id: &RevisionId,
        next_token: Option<&str>,
    ) -> Result<AssetPage>;
}

/// A page of a revision's asset listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetPage {
    pub assets: Vec<Asset>,

    /// Continuation token; `None` on the last page
    pub next_token: Option<String>,
}

impl AssetPage {
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}
