//! Scriptable in-memory [`ExchangeApi`]
//!
//! Stands in for the remote service in tests. Each created job consumes the
//! next queued [`JobScript`] (or the default "completes on second poll"
//! script) which decides the states returned by successive `get_job` calls
//! and how many assets appear when the job completes. Every call is recorded
//! so tests can assert ordering and counts.

use crate::api::{AssetPage, ExchangeApi};
use crate::asset::{Asset, AssetDetails};
use crate::error::{CloudError, Result};
use crate::job::{
    CreatedJob, JobDetails, JobError, JobRequest, JobSnapshot, JobState, JobType, SignedUpload,
};
use crate::revision::{CreateRevision, Revision, RevisionId, RevisionUpdate};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

const ACCOUNT_ARN_PREFIX: &str = "arn:aws:dataexchange:us-east-1:123456789012";
const DEFAULT_PAGE_SIZE: usize = 100;

/// A recorded API call
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    CreateRevision { data_set_id: String },
    GetRevision(RevisionId),
    UpdateRevision { id: RevisionId, update: RevisionUpdate },
    DeleteRevision(RevisionId),
    CreateJob(JobType),
    StartJob(String),
    GetJob(String),
    ListAssets { id: RevisionId, next_token: Option<String> },
}

/// Scripted behaviour of one job
#[derive(Debug, Clone)]
pub struct JobScript {
    /// States returned by successive polls; the last one repeats
    pub states: Vec<JobState>,

    /// Causes reported while in `Error`
    pub errors: Vec<JobError>,

    /// Assets attached to the revision when the job first reports `Completed`
    pub assets_on_completion: usize,
}

impl JobScript {
    pub fn completes() -> Self {
        Self::sequence(vec![JobState::InProgress, JobState::Completed])
    }

    pub fn sequence(states: Vec<JobState>) -> Self {
        Self {
            states,
            errors: Vec::new(),
            assets_on_completion: 1,
        }
    }

    pub fn fails(errors: Vec<JobError>) -> Self {
        Self {
            states: vec![JobState::InProgress, JobState::Error],
            errors,
            assets_on_completion: 0,
        }
    }

    pub fn never_finishes() -> Self {
        Self::sequence(vec![JobState::Waiting, JobState::InProgress])
    }

    pub fn with_assets(mut self, count: usize) -> Self {
        self.assets_on_completion = count;
        self
    }
}

struct FakeJob {
    request: JobRequest,
    script: JobScript,
    started: bool,
    polls: usize,
    materialized: bool,
}

struct Inner {
    revisions: HashMap<String, Revision>,
    assets: HashMap<String, Vec<Asset>>,
    jobs: HashMap<String, FakeJob>,
    scripts: VecDeque<JobScript>,
    calls: Vec<ApiCall>,
    job_requests: Vec<JobRequest>,
    page_size: usize,
    upload_base_url: String,
    create_job_failure: Option<String>,
    start_job_failure: Option<String>,
}

/// In-memory data exchange service
pub struct InMemoryExchange {
    inner: Mutex<Inner>,
}

impl Default for InMemoryExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryExchange {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                revisions: HashMap::new(),
                assets: HashMap::new(),
                jobs: HashMap::new(),
                scripts: VecDeque::new(),
                calls: Vec::new(),
                job_requests: Vec::new(),
                page_size: DEFAULT_PAGE_SIZE,
                upload_base_url: "http://127.0.0.1:9/upload".to_string(),
                create_job_failure: None,
                start_job_failure: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the behaviour of the next created job
    pub fn push_job_script(&self, script: JobScript) {
        self.lock().scripts.push_back(script);
    }

    /// Limit listing pages so pagination gets exercised
    pub fn set_page_size(&self, page_size: usize) {
        self.lock().page_size = page_size.max(1);
    }

    /// Base of the pre-signed URLs handed out for signed-URL imports
    pub fn set_upload_base_url(&self, url: impl Into<String>) {
        self.lock().upload_base_url = url.into();
    }

    pub fn fail_next_create_job(&self, message: impl Into<String>) {
        self.lock().create_job_failure = Some(message.into());
    }

    pub fn fail_next_start_job(&self, message: impl Into<String>) {
        self.lock().start_job_failure = Some(message.into());
    }

    /// Attach an asset out of band (e.g. created by an earlier build)
    pub fn insert_asset(&self, id: &RevisionId, name: &str) -> Option<Asset> {
        let mut inner = self.lock();
        if !inner.revisions.contains_key(&id.key()) {
            return None;
        }
        let asset = snapshot_asset(id, name, 0);
        inner
            .assets
            .entry(id.key())
            .or_default()
            .push(asset.clone());
        Some(asset)
    }

    /// Force a revision's finalized flag without recording a call
    pub fn set_finalized(&self, id: &RevisionId, finalized: bool) {
        if let Some(revision) = self.lock().revisions.get_mut(&id.key()) {
            revision.finalized = finalized;
        }
    }

    pub fn revision(&self, id: &RevisionId) -> Option<Revision> {
        self.lock().revisions.get(&id.key()).cloned()
    }

    pub fn assets(&self, id: &RevisionId) -> Vec<Asset> {
        self.lock().assets.get(&id.key()).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn job_requests(&self) -> Vec<JobRequest> {
        self.lock().job_requests.clone()
    }

    /// Number of recorded calls matching a predicate
    pub fn count_calls(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| predicate(c)).count()
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn revision_arn(id: &RevisionId) -> String {
    format!(
        "{}:data-sets/{}/revisions/{}",
        ACCOUNT_ARN_PREFIX, id.data_set_id, id.revision_id
    )
}

fn snapshot_asset(revision: &RevisionId, name: &str, size: u64) -> Asset {
    let now = Utc::now();
    let id = new_id();
    Asset {
        arn: format!("{}/assets/{}", revision_arn(revision), id),
        id,
        name: name.to_string(),
        revision: revision.clone(),
        details: AssetDetails::S3Snapshot { size },
        created_at: now,
        updated_at: now,
    }
}

fn materialize(request: &JobRequest) -> Asset {
    match &request.details {
        JobDetails::ImportAssetsFromS3 { key, .. } => snapshot_asset(&request.revision, key, 0),
        JobDetails::ImportAssetFromSignedUrl { asset_name, .. } => {
            snapshot_asset(&request.revision, asset_name, 0)
        }
        JobDetails::CreateS3DataAccessFromS3Bucket {
            bucket,
            key_prefixes,
            keys,
            kms_keys_to_grant,
        } => {
            let now = Utc::now();
            let id = new_id();
            let access_point = uuid::Uuid::new_v4().hyphenated().to_string();
            Asset {
                arn: format!("{}/assets/{}", revision_arn(&request.revision), id),
                name: format!("s3-data-access-{}", id),
                revision: request.revision.clone(),
                details: AssetDetails::S3DataAccess {
                    bucket: bucket.clone(),
                    access_point_arn: format!(
                        "arn:aws:s3:us-east-1:123456789012:accesspoint/{}",
                        access_point
                    ),
                    access_point_alias: format!("{}-s3alias", &id[..12]),
                    key_prefixes: key_prefixes.clone(),
                    keys: keys.clone(),
                    kms_keys_to_grant: kms_keys_to_grant.clone(),
                },
                id,
                created_at: now,
                updated_at: now,
            }
        }
    }
}

#[async_trait]
impl ExchangeApi for InMemoryExchange {
    async fn create_revision(&self, input: &CreateRevision) -> Result<Revision> {
        let mut inner = self.lock();
        inner.calls.push(ApiCall::CreateRevision {
            data_set_id: input.data_set_id.clone(),
        });

        let now = Utc::now();
        let id = RevisionId::new(input.data_set_id.clone(), new_id());
        let revision = Revision {
            arn: revision_arn(&id),
            id: id.clone(),
            comment: input.comment.clone(),
            finalized: false,
            tags: input.tags.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.revisions.insert(id.key(), revision.clone());
        inner.assets.insert(id.key(), Vec::new());
        Ok(revision)
    }

    async fn get_revision(&self, id: &RevisionId) -> Result<Revision> {
        let mut inner = self.lock();
        inner.calls.push(ApiCall::GetRevision(id.clone()));
        inner
            .revisions
            .get(&id.key())
            .cloned()
            .ok_or_else(|| CloudError::RevisionNotFound(id.to_string()))
    }

    async fn update_revision(&self, id: &RevisionId, update: &RevisionUpdate) -> Result<Revision> {
        let mut inner = self.lock();
        inner.calls.push(ApiCall::UpdateRevision {
            id: id.clone(),
            update: update.clone(),
        });

        let revision = inner
            .revisions
            .get_mut(&id.key())
            .ok_or_else(|| CloudError::RevisionNotFound(id.to_string()))?;

        if revision.finalized && update.comment.is_some() && update.finalized != Some(false) {
            return Err(CloudError::Conflict(format!(
                "revision {} is finalized and cannot be modified",
                id
            )));
        }

        if let Some(comment) = &update.comment {
            revision.comment = Some(comment.clone());
        }
        if let Some(finalized) = update.finalized {
            revision.finalized = finalized;
        }
        revision.updated_at = Utc::now();
        Ok(revision.clone())
    }

    async fn delete_revision(&self, id: &RevisionId) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(ApiCall::DeleteRevision(id.clone()));

        match inner.revisions.get(&id.key()) {
            None => return Err(CloudError::RevisionNotFound(id.to_string())),
            Some(revision) if revision.finalized => {
                return Err(CloudError::Conflict(format!(
                    "revision {} is finalized and cannot be deleted",
                    id
                )));
            }
            Some(_) => {}
        }
        inner.revisions.remove(&id.key());
        inner.assets.remove(&id.key());
        Ok(())
    }

    async fn create_job(&self, request: &JobRequest) -> Result<CreatedJob> {
        let mut inner = self.lock();
        let job_type = request.details.job_type();
        inner.calls.push(ApiCall::CreateJob(job_type));

        if let Some(message) = inner.create_job_failure.take() {
            return Err(CloudError::ApiError(message));
        }
        match inner.revisions.get(&request.revision.key()) {
            None => return Err(CloudError::RevisionNotFound(request.revision.to_string())),
            Some(revision) if revision.finalized => {
                return Err(CloudError::Conflict(format!(
                    "revision {} is finalized",
                    request.revision
                )));
            }
            Some(_) => {}
        }

        let id = new_id();
        let signed_upload = match job_type {
            JobType::ImportAssetFromSignedUrl => Some(SignedUpload {
                url: format!("{}/{}", inner.upload_base_url, id),
                expires_at: Some(Utc::now() + chrono::Duration::minutes(15)),
            }),
            _ => None,
        };
        let script = inner
            .scripts
            .pop_front()
            .unwrap_or_else(JobScript::completes);

        inner.job_requests.push(request.clone());
        inner.jobs.insert(
            id.clone(),
            FakeJob {
                request: request.clone(),
                script,
                started: false,
                polls: 0,
                materialized: false,
            },
        );

        Ok(CreatedJob {
            id,
            job_type,
            state: JobState::Waiting,
            signed_upload,
        })
    }

    async fn start_job(&self, job_id: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.calls.push(ApiCall::StartJob(job_id.to_string()));

        if let Some(message) = inner.start_job_failure.take() {
            return Err(CloudError::ApiError(message));
        }
        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CloudError::JobNotFound(job_id.to_string()))?;
        job.started = true;
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<JobSnapshot> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.calls.push(ApiCall::GetJob(job_id.to_string()));

        let job = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CloudError::JobNotFound(job_id.to_string()))?;

        let state = if !job.started {
            JobState::Waiting
        } else {
            let index = job.polls.min(job.script.states.len().saturating_sub(1));
            job.polls += 1;
            job.script
                .states
                .get(index)
                .copied()
                .unwrap_or(JobState::Completed)
        };

        if state == JobState::Completed && !job.materialized {
            job.materialized = true;
            let produced: Vec<Asset> = (0..job.script.assets_on_completion)
                .map(|_| materialize(&job.request))
                .collect();
            inner
                .assets
                .entry(job.request.revision.key())
                .or_default()
                .extend(produced);
        }

        Ok(JobSnapshot {
            id: job_id.to_string(),
            job_type: job.request.details.job_type(),
            state,
            errors: if state == JobState::Error {
                job.script.errors.clone()
            } else {
                Vec::new()
            },
            updated_at: Utc::now(),
        })
    }

    async fn list_revision_assets(
        &self,
        id: &RevisionId,
        next_token: Option<&str>,
    ) -> Result<AssetPage> {
        let mut inner = self.lock();
        inner.calls.push(ApiCall::ListAssets {
            id: id.clone(),
            next_token: next_token.map(str::to_string),
        });

        let assets = inner
            .assets
            .get(&id.key())
            .ok_or_else(|| CloudError::RevisionNotFound(id.to_string()))?;

        let offset = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| CloudError::Validation(format!("bad continuation token: {token}")))?,
            None => 0,
        };
        let end = (offset + inner.page_size).min(assets.len());
        let page = assets.get(offset..end).unwrap_or_default().to_vec();

        Ok(AssetPage {
            assets: page,
            next_token: (end < assets.len()).then(|| end.to_string()),
        })
    }
}
