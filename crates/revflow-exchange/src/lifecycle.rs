//! Revision lifecycle
//!
//! [`RevisionManager`] drives a build: create (or reopen) the revision, run
//! every asset spec through submit → upload → poll → reconcile strictly one
//! after another, then finalize on request. Any failure ends the build and
//! leaves whatever was already materialized in place.

use crate::error::{ExchangeError, Result};
use crate::finalize::{apply_comment, prepare_delete, set_finalized};
use crate::poll::{PollConfig, poll_job};
use crate::reconcile::{KnownIdSet, list_all_assets, reconcile_new_asset};
use crate::submit::submit_job;
use crate::upload::UploadStreamer;
use revflow_cloud::{
    Asset, AssetSpec, CreateRevision, ExchangeApi, JobDetails, MaterializedAsset, Revision,
    RevisionId, RevisionState, RevisionUpdate, StateStore,
};
use revflow_config::EngineConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Desired content of a revision
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevisionPlan {
    pub data_set_id: String,
    pub comment: Option<String>,
    pub tags: HashMap<String, String>,

    /// Materialized in declaration order
    pub assets: Vec<AssetSpec>,

    /// Finalize once every asset is present
    pub finalized: bool,
}

impl RevisionPlan {
    pub fn new(data_set_id: impl Into<String>) -> Self {
        Self {
            data_set_id: data_set_id.into(),
            ..Default::default()
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_asset(mut self, spec: AssetSpec) -> Self {
        self.assets.push(spec);
        self
    }

    pub fn finalized(mut self, finalized: bool) -> Self {
        self.finalized = finalized;
        self
    }

    fn validate(&self) -> Result<()> {
        for (index, spec) in self.assets.iter().enumerate() {
            spec.validate()
                .map_err(|source| ExchangeError::InvalidSpec { index, source })?;
        }
        Ok(())
    }
}

/// Where a build puts its assets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildPolicy {
    /// Create a fresh revision
    Replace,
    /// Add to an existing revision, treating its current assets as known
    Upsert(RevisionId),
}

/// Remote view of a revision as returned by [`RevisionManager::read`]
#[derive(Debug, Clone, PartialEq)]
pub struct RevisionSnapshot {
    pub revision: Revision,
    pub assets: Vec<Asset>,
}

impl RevisionSnapshot {
    /// Recorded assets that no longer appear on the revision
    pub fn missing_assets<'a>(
        &self,
        recorded: &'a [MaterializedAsset],
    ) -> Vec<&'a MaterializedAsset> {
        recorded
            .iter()
            .filter(|m| !self.assets.iter().any(|a| a.id == m.id()))
            .collect()
    }
}

/// Builds, refreshes, updates and deletes revisions
pub struct RevisionManager<A: ExchangeApi + ?Sized> {
    api: Arc<A>,
    uploader: UploadStreamer,
    config: EngineConfig,
    state: Option<StateStore>,
}

impl<A: ExchangeApi + ?Sized> RevisionManager<A> {
    pub fn new(api: Arc<A>, config: EngineConfig) -> Self {
        Self {
            uploader: UploadStreamer::new(config.upload_timeout()),
            api,
            config,
            state: None,
        }
    }

    pub fn with_uploader(mut self, uploader: UploadStreamer) -> Self {
        self.uploader = uploader;
        self
    }

    /// Record finished builds in a local state snapshot
    pub fn with_state_store(mut self, store: StateStore) -> Self {
        self.state = Some(store);
        self
    }

    /// Record finished builds under the configured `state_dir`
    pub fn persisting(self) -> Self {
        let store = StateStore::new(&self.config.state_dir);
        self.with_state_store(store)
    }

    /// Build a new revision from the plan
    pub async fn create(
        &self,
        plan: &RevisionPlan,
        cancel: &CancellationToken,
    ) -> Result<RevisionState> {
        self.build(plan, BuildPolicy::Replace, cancel).await
    }

    /// Build the plan's assets into a revision chosen by `policy`
    ///
    /// The returned state lists only the assets materialized by this call.
    /// Once the revision exists, a failure comes back as
    /// [`ExchangeError::Build`] naming it, and the partial build is recorded
    /// in the state store.
    pub async fn build(
        &self,
        plan: &RevisionPlan,
        policy: BuildPolicy,
        cancel: &CancellationToken,
    ) -> Result<RevisionState> {
        plan.validate()?;

        let (revision, known, timeout) = match policy {
            BuildPolicy::Replace => {
                let input = CreateRevision {
                    data_set_id: plan.data_set_id.clone(),
                    comment: plan.comment.clone(),
                    tags: plan.tags.clone(),
                };
                let revision = self.api.create_revision(&input).await?;
                tracing::info!(revision = %revision.id, "Created revision");
                (revision, KnownIdSet::new(), self.config.create_timeout())
            }
            BuildPolicy::Upsert(id) => {
                let current = self.api.get_revision(&id).await?;
                let mut revision = set_finalized(&*self.api, &current, false).await?;
                if let Some(comment) = &plan.comment {
                    revision = apply_comment(&*self.api, &revision, comment).await?;
                }
                let existing = list_all_assets(&*self.api, &revision.id).await?;
                let known = KnownIdSet::seeded(existing.into_iter().map(|a| a.id));
                tracing::info!(
                    revision = %revision.id,
                    existing = known.len(),
                    "Reopened revision"
                );
                (revision, known, self.config.update_timeout())
            }
        };

        let mut assets = Vec::with_capacity(plan.assets.len());
        let outcome = match self
            .materialize_into(&revision.id, &plan.assets, known, timeout, cancel, &mut assets)
            .await
        {
            Ok(_) if plan.finalized => set_finalized(&*self.api, &revision, true).await,
            Ok(_) => Ok(revision.clone()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(revision) => {
                let built = RevisionState::new(revision, assets);
                self.record(&built).await;
                Ok(built)
            }
            Err(source) => {
                let partial = RevisionState::new(revision, assets);
                tracing::warn!(
                    revision = %partial.id(),
                    materialized = partial.assets.len(),
                    "Build failed; leaving partial revision in place"
                );
                self.record(&partial).await;
                Err(ExchangeError::Build {
                    revision: partial.id().clone(),
                    materialized: partial.assets.len(),
                    source: Box::new(source),
                })
            }
        }
    }

    /// Run each spec to a reconciled asset, one at a time
    ///
    /// `known` must hold every asset id already on the revision. The set is
    /// returned extended by one id per spec.
    pub async fn materialize(
        &self,
        revision: &RevisionId,
        specs: &[AssetSpec],
        known: KnownIdSet,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<(Vec<MaterializedAsset>, KnownIdSet)> {
        let mut materialized = Vec::with_capacity(specs.len());
        let known = self
            .materialize_into(revision, specs, known, timeout, cancel, &mut materialized)
            .await?;
        Ok((materialized, known))
    }

    /// Same as [`materialize`](Self::materialize), appending to `materialized`
    /// so the assets finished before a failure stay with the caller
    async fn materialize_into(
        &self,
        revision: &RevisionId,
        specs: &[AssetSpec],
        known: KnownIdSet,
        timeout: Duration,
        cancel: &CancellationToken,
        materialized: &mut Vec<MaterializedAsset>,
    ) -> Result<KnownIdSet> {
        let poll = PollConfig::new(self.config.poll_interval(), timeout);
        let mut known = known;

        for (index, spec) in specs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ExchangeError::Cancelled { operation: "build" });
            }

            let (asset, next) = self
                .materialize_one(revision, spec, known, poll, cancel)
                .await?;
            known = next;

            tracing::info!(
                %revision,
                index,
                asset_id = %asset.id,
                name = %asset.name,
                "Materialized asset"
            );
            materialized.push(MaterializedAsset {
                spec: spec.clone(),
                asset,
            });
        }

        Ok(known)
    }

    async fn materialize_one(
        &self,
        revision: &RevisionId,
        spec: &AssetSpec,
        known: KnownIdSet,
        poll: PollConfig,
        cancel: &CancellationToken,
    ) -> Result<(Asset, KnownIdSet)> {
        let api = &*self.api;
        let job = match spec {
            AssetSpec::ImportFromCloudStorage { bucket, key } => {
                let details = JobDetails::ImportAssetsFromS3 {
                    bucket: bucket.clone(),
                    key: key.clone(),
                };
                submit_job(api, revision, details).await?
            }
            AssetSpec::ImportFromSignedUpload { local_filename } => {
                self.uploader
                    .import_file(api, revision, local_filename, cancel)
                    .await?
            }
            AssetSpec::CreateDataAccessGrant {
                bucket,
                key_prefixes,
                keys,
                kms_keys_to_grant,
            } => {
                let details = JobDetails::CreateS3DataAccessFromS3Bucket {
                    bucket: bucket.clone(),
                    key_prefixes: key_prefixes.clone(),
                    keys: keys.clone(),
                    kms_keys_to_grant: kms_keys_to_grant.clone(),
                };
                submit_job(api, revision, details).await?
            }
        };

        let snapshot = poll_job(api, &job.id, poll, cancel).await?;
        reconcile_new_asset(api, revision, &snapshot.id, known).await
    }

    /// Fetch the revision and all of its assets; `None` once it is gone
    pub async fn read(&self, id: &RevisionId) -> Result<Option<RevisionSnapshot>> {
        let revision = match self.api.get_revision(id).await {
            Ok(revision) => revision,
            Err(e) if e.is_not_found() => {
                tracing::debug!(revision = %id, "Revision no longer exists");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let assets = list_all_assets(&*self.api, id).await?;
        Ok(Some(RevisionSnapshot { revision, assets }))
    }

    /// Apply comment and finalized changes
    ///
    /// A comment change on a finalized revision de-finalizes it first; it is
    /// finalized again afterwards unless `desired` says otherwise.
    pub async fn update(&self, id: &RevisionId, desired: &RevisionUpdate) -> Result<Revision> {
        let current = self.api.get_revision(id).await?;
        let target = desired.finalized.unwrap_or(current.finalized);

        let revision = match &desired.comment {
            Some(comment) => apply_comment(&*self.api, &current, comment).await?,
            None => current,
        };
        let revision = set_finalized(&*self.api, &revision, target).await?;

        if let Some(store) = &self.state {
            store.update(|state| state.refresh_revision(&revision)).await?;
        }
        Ok(revision)
    }

    /// Delete a revision within the delete budget
    ///
    /// A finalized revision needs `force`. A revision that is already gone
    /// counts as deleted.
    pub async fn delete(
        &self,
        id: &RevisionId,
        force: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let timeout = self.config.delete_timeout();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExchangeError::Cancelled { operation: "delete" }),
            result = tokio::time::timeout(timeout, self.delete_now(id, force)) => {
                result.map_err(|_| ExchangeError::OperationTimeout {
                    operation: "delete",
                    timeout,
                })?
            }
        }
    }

    async fn delete_now(&self, id: &RevisionId, force: bool) -> Result<()> {
        let revision = match self.api.get_revision(id).await {
            Ok(revision) => revision,
            Err(e) if e.is_not_found() => {
                tracing::debug!(revision = %id, "Revision already deleted");
                return self.forget(id).await;
            }
            Err(e) => return Err(e.into()),
        };

        prepare_delete(&*self.api, &revision, force).await?;
        match self.api.delete_revision(id).await {
            Ok(()) => tracing::info!(revision = %id, "Deleted revision"),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.forget(id).await
    }

    /// Local bookkeeping never fails a build that already happened remotely
    async fn record(&self, built: &RevisionState) {
        let Some(store) = &self.state else {
            return;
        };
        if let Err(e) = store.update(|state| state.record_build(built)).await {
            tracing::warn!(
                revision = %built.id(),
                dir = %self.config.state_dir.display(),
                "Failed to record revision state: {}",
                e
            );
        }
    }

    async fn forget(&self, id: &RevisionId) -> Result<()> {
        if let Some(store) = &self.state {
            store
                .update(|state| {
                    state.remove_revision(id);
                })
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revflow_cloud::{InMemoryExchange, JobError, JobScript, JobState};
    use std::path::Path;

    fn manager(api: &Arc<InMemoryExchange>) -> RevisionManager<InMemoryExchange> {
        RevisionManager::new(Arc::clone(api), EngineConfig::default())
    }

    fn persisting_manager(
        api: &Arc<InMemoryExchange>,
        state_dir: &Path,
    ) -> RevisionManager<InMemoryExchange> {
        let config = EngineConfig {
            state_dir: state_dir.to_path_buf(),
            ..Default::default()
        };
        RevisionManager::new(Arc::clone(api), config).persisting()
    }

    #[test]
    fn test_plan_builder() {
        let plan = RevisionPlan::new("ds-1")
            .with_comment("monthly")
            .with_tag("team", "data")
            .with_asset(AssetSpec::import_from_cloud_storage("bucket", "a.csv"))
            .finalized(true);

        assert_eq!(plan.assets.len(), 1);
        assert_eq!(plan.tags.get("team").map(String::as_str), Some("data"));
        assert!(plan.finalized);
    }

    #[tokio::test]
    async fn test_invalid_spec_is_rejected_before_any_call() {
        let api = Arc::new(InMemoryExchange::new());
        let plan = RevisionPlan::new("ds-1")
            .with_asset(AssetSpec::import_from_cloud_storage("bucket", "a.csv"))
            .with_asset(AssetSpec::import_from_cloud_storage("", "b.csv"));

        let err = manager(&api)
            .create(&plan, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::InvalidSpec { index: 1, .. }));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_records_state() {
        let api = Arc::new(InMemoryExchange::new());
        api.push_job_script(JobScript::sequence(vec![JobState::Completed]));
        let state_dir = tempfile::tempdir().unwrap();
        let manager = persisting_manager(&api, state_dir.path());
        let plan = RevisionPlan::new("ds-1")
            .with_asset(AssetSpec::import_from_cloud_storage("bucket", "a.csv"));

        let built = manager.create(&plan, &CancellationToken::new()).await.unwrap();

        let state = StateStore::new(state_dir.path()).load().await.unwrap();
        let recorded = state.get_revision(built.id()).unwrap();
        assert_eq!(recorded.assets.len(), 1);
        assert_eq!(recorded.assets[0].asset.name, "a.csv");

        manager
            .delete(built.id(), false, &CancellationToken::new())
            .await
            .unwrap();
        let state = StateStore::new(state_dir.path()).load().await.unwrap();
        assert!(state.get_revision(built.id()).is_none());
    }

    #[tokio::test]
    async fn test_failed_build_names_revision_and_records_partial_state() {
        let api = Arc::new(InMemoryExchange::new());
        api.push_job_script(JobScript::sequence(vec![JobState::Completed]));
        api.push_job_script(JobScript {
            states: vec![JobState::Error],
            ..JobScript::fails(vec![JobError::new("A", "m1")])
        });
        let state_dir = tempfile::tempdir().unwrap();
        let manager = persisting_manager(&api, state_dir.path());
        let plan = RevisionPlan::new("ds-1")
            .with_asset(AssetSpec::import_from_cloud_storage("bucket", "a.csv"))
            .with_asset(AssetSpec::import_from_cloud_storage("bucket", "b.csv"));

        let err = manager
            .create(&plan, &CancellationToken::new())
            .await
            .unwrap_err();

        let revision = api.job_requests()[0].revision.clone();
        assert_eq!(err.revision(), Some(&revision));
        assert!(err.to_string().contains(&revision.to_string()));
        match err.root() {
            ExchangeError::JobFailed { message, .. } => assert_eq!(message, "A: m1"),
            other => panic!("unexpected error: {other:?}"),
        }

        let state = StateStore::new(state_dir.path()).load().await.unwrap();
        let recorded = state.get_revision(&revision).unwrap();
        assert_eq!(recorded.assets.len(), 1);
        assert_eq!(recorded.assets[0].asset.name, "a.csv");
    }

    #[tokio::test]
    async fn test_build_survives_held_state_lock() {
        let api = Arc::new(InMemoryExchange::new());
        api.push_job_script(JobScript::sequence(vec![JobState::Completed]));
        let state_dir = tempfile::tempdir().unwrap();
        let manager = persisting_manager(&api, state_dir.path());
        let plan = RevisionPlan::new("ds-1")
            .with_asset(AssetSpec::import_from_cloud_storage("bucket", "a.csv"))
            .finalized(true);

        let lock = StateStore::new(state_dir.path())
            .acquire_lock()
            .await
            .unwrap();
        let built = manager.create(&plan, &CancellationToken::new()).await.unwrap();
        lock.release().await.unwrap();

        assert!(built.revision.finalized);
        assert!(api.revision(built.id()).unwrap().finalized);
        let state = StateStore::new(state_dir.path()).load().await.unwrap();
        assert!(state.get_revision(built.id()).is_none());
    }

    #[tokio::test]
    async fn test_missing_assets_reports_drift() {
        let api = Arc::new(InMemoryExchange::new());
        let revision = api
            .create_revision(&CreateRevision::new("ds-1"))
            .await
            .unwrap();
        let kept = api.insert_asset(&revision.id, "kept").unwrap();
        let gone = api.insert_asset(&revision.id, "gone").unwrap();

        let recorded = vec![
            MaterializedAsset {
                spec: AssetSpec::import_from_cloud_storage("b", "kept"),
                asset: kept.clone(),
            },
            MaterializedAsset {
                spec: AssetSpec::import_from_cloud_storage("b", "gone"),
                asset: gone,
            },
        ];
        let snapshot = RevisionSnapshot {
            revision,
            assets: vec![kept],
        };

        let missing = snapshot.missing_assets(&recorded);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].asset.name, "gone");
    }
}
