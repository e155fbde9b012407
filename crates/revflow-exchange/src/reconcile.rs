//! Asset reconciliation
//!
//! A completed job does not return the id of the asset it produced. The id is
//! recovered by listing every asset attached to the revision and keeping the
//! ones not already accounted for in the [`KnownIdSet`].

use crate::error::{ExchangeError, Result};
use revflow_cloud::{Asset, ExchangeApi, RevisionId};
use std::collections::HashSet;

/// Asset ids already attributed to earlier specs of one build
///
/// Append-only, insertion-ordered, and owned by exactly one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownIdSet {
    order: Vec<String>,
    index: HashSet<String>,
}

impl KnownIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from ids that already exist in the revision
    pub fn seeded<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        ids.into_iter().fold(Self::new(), Self::with)
    }

    /// Return the set extended by `id`
    pub fn with(mut self, id: String) -> Self {
        if self.index.insert(id.clone()) {
            self.order.push(id);
        }
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

/// Fetch every page of the revision's asset listing
pub async fn list_all_assets<A>(api: &A, revision: &RevisionId) -> Result<Vec<Asset>>
where
    A: ExchangeApi + ?Sized,
{
    let mut assets = Vec::new();
    let mut next_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = api
            .list_revision_assets(revision, next_token.as_deref())
            .await?;
        pages += 1;
        assets.extend(page.assets);

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    tracing::trace!(%revision, pages, assets = assets.len(), "Listed revision assets");
    Ok(assets)
}

/// Assets whose ids are not in `known`, in listing order
pub fn unseen_assets(assets: Vec<Asset>, known: &KnownIdSet) -> Vec<Asset> {
    assets
        .into_iter()
        .filter(|asset| !known.contains(&asset.id))
        .collect()
}

/// Identify the single asset the job produced and extend the known set
///
/// Exactly one unseen asset is expected; zero fails with `Reconciliation`
/// and more than one fails with `AmbiguousAssets`.
pub async fn reconcile_new_asset<A>(
    api: &A,
    revision: &RevisionId,
    job_id: &str,
    known: KnownIdSet,
) -> Result<(Asset, KnownIdSet)>
where
    A: ExchangeApi + ?Sized,
{
    let listing = list_all_assets(api, revision).await?;
    let mut unseen = unseen_assets(listing, &known);

    match unseen.len() {
        0 => Err(ExchangeError::Reconciliation {
            revision: revision.clone(),
            job_id: job_id.to_string(),
        }),
        1 => {
            let asset = unseen.remove(0);
            tracing::debug!(asset_id = %asset.id, job_id, "Reconciled new asset");
            let known = known.with(asset.id.clone());
            Ok((asset, known))
        }
        _ => Err(ExchangeError::AmbiguousAssets {
            revision: revision.clone(),
            job_id: job_id.to_string(),
            ids: unseen.into_iter().map(|a| a.id).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revflow_cloud::{ApiCall, CreateRevision, InMemoryExchange};

    async fn revision(api: &InMemoryExchange) -> RevisionId {
        api.create_revision(&CreateRevision::new("ds-1"))
            .await
            .unwrap()
            .id
    }

    #[test]
    fn test_known_id_set_is_ordered_and_deduplicated() {
        let known = KnownIdSet::seeded(vec!["a".to_string(), "b".to_string()])
            .with("c".to_string())
            .with("a".to_string());

        assert_eq!(known.len(), 3);
        assert_eq!(known.iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert!(known.contains("b"));
        assert!(!known.contains("d"));
    }

    #[tokio::test]
    async fn test_list_all_assets_exhausts_pages() {
        let api = InMemoryExchange::new();
        let id = revision(&api).await;
        for name in ["one", "two", "three"] {
            api.insert_asset(&id, name);
        }
        api.set_page_size(1);

        let assets = list_all_assets(&api, &id).await.unwrap();

        assert_eq!(assets.len(), 3);
        assert_eq!(
            api.count_calls(|c| matches!(c, ApiCall::ListAssets { .. })),
            3
        );
    }

    #[tokio::test]
    async fn test_reconcile_finds_the_single_new_asset() {
        let api = InMemoryExchange::new();
        let id = revision(&api).await;
        let existing = api.insert_asset(&id, "existing").unwrap();
        let created = api.insert_asset(&id, "created").unwrap();

        let known = KnownIdSet::seeded(vec![existing.id.clone()]);
        let (asset, known) = reconcile_new_asset(&api, &id, "job-1", known)
            .await
            .unwrap();

        assert_eq!(asset.id, created.id);
        assert_eq!(known.len(), 2);
        assert!(known.contains(&created.id));
    }

    #[tokio::test]
    async fn test_reconcile_without_new_asset_fails() {
        let api = InMemoryExchange::new();
        let id = revision(&api).await;
        let existing = api.insert_asset(&id, "existing").unwrap();

        let err = reconcile_new_asset(&api, &id, "job-1", KnownIdSet::seeded(vec![existing.id]))
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::Reconciliation { .. }));
        assert!(err.to_string().contains("missing new asset"));
    }

    #[tokio::test]
    async fn test_reconcile_with_two_new_assets_is_ambiguous() {
        let api = InMemoryExchange::new();
        let id = revision(&api).await;
        api.insert_asset(&id, "first");
        api.insert_asset(&id, "second");

        let err = reconcile_new_asset(&api, &id, "job-1", KnownIdSet::new())
            .await
            .unwrap_err();

        match err {
            ExchangeError::AmbiguousAssets { ids, .. } => assert_eq!(ids.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
