//! Finalization control
//!
//! `finalized` gates mutation upstream: a finalized revision rejects comment
//! edits and deletes. These helpers sequence the de-finalize step in front of
//! such mutations.

use crate::error::{ExchangeError, Result};
use revflow_cloud::{ExchangeApi, Revision, RevisionUpdate};

/// Set the finalized flag; no call is made when it already has that value
pub async fn set_finalized<A>(api: &A, revision: &Revision, finalized: bool) -> Result<Revision>
where
    A: ExchangeApi + ?Sized,
{
    if revision.finalized == finalized {
        return Ok(revision.clone());
    }

    let updated = api
        .update_revision(&revision.id, &RevisionUpdate::finalized(finalized))
        .await?;
    if finalized {
        tracing::info!(revision = %revision.id, "Finalized revision");
    } else {
        tracing::info!(revision = %revision.id, "De-finalized revision");
    }
    Ok(updated)
}

/// Change the comment, de-finalizing first when needed
///
/// The returned revision is left de-finalized; re-finalizing is up to the
/// caller.
pub async fn apply_comment<A>(api: &A, revision: &Revision, comment: &str) -> Result<Revision>
where
    A: ExchangeApi + ?Sized,
{
    if revision.comment.as_deref() == Some(comment) {
        return Ok(revision.clone());
    }

    let current = if revision.finalized {
        tracing::warn!(
            revision = %revision.id,
            "Revision is finalized; de-finalizing before changing the comment"
        );
        set_finalized(api, revision, false).await?
    } else {
        revision.clone()
    };

    let updated = api
        .update_revision(&current.id, &RevisionUpdate::comment(comment))
        .await?;
    tracing::debug!(revision = %updated.id, "Updated revision comment");
    Ok(updated)
}

/// Make a revision deletable
///
/// Finalized revisions are refused unless `force` is set, in which case they
/// are de-finalized exactly once.
pub async fn prepare_delete<A>(api: &A, revision: &Revision, force: bool) -> Result<Revision>
where
    A: ExchangeApi + ?Sized,
{
    if !revision.finalized {
        return Ok(revision.clone());
    }
    if !force {
        tracing::warn!(
            revision = %revision.id,
            "Refusing to delete finalized revision without force"
        );
        return Err(ExchangeError::RevisionFinalized(revision.id.clone()));
    }
    set_finalized(api, revision, false).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use revflow_cloud::{ApiCall, CreateRevision, InMemoryExchange};

    async fn finalized_revision(api: &InMemoryExchange) -> Revision {
        let revision = api
            .create_revision(&CreateRevision::new("ds-1").with_comment("v1"))
            .await
            .unwrap();
        api.set_finalized(&revision.id, true);
        api.revision(&revision.id).unwrap()
    }

    fn update_calls(api: &InMemoryExchange) -> Vec<RevisionUpdate> {
        api.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::UpdateRevision { update, .. } => Some(update),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_set_finalized_skips_unchanged_flag() {
        let api = InMemoryExchange::new();
        let revision = finalized_revision(&api).await;

        let result = set_finalized(&api, &revision, true).await.unwrap();

        assert!(result.finalized);
        assert!(update_calls(&api).is_empty());
    }

    #[tokio::test]
    async fn test_comment_on_finalized_revision_definalizes_first() {
        let api = InMemoryExchange::new();
        let revision = finalized_revision(&api).await;

        let updated = apply_comment(&api, &revision, "v2").await.unwrap();

        assert_eq!(updated.comment.as_deref(), Some("v2"));
        assert!(!updated.finalized);
        assert_eq!(
            update_calls(&api),
            vec![RevisionUpdate::finalized(false), RevisionUpdate::comment("v2")]
        );
    }

    #[tokio::test]
    async fn test_prepare_delete_refuses_without_force() {
        let api = InMemoryExchange::new();
        let revision = finalized_revision(&api).await;

        let err = prepare_delete(&api, &revision, false).await.unwrap_err();

        assert!(matches!(err, ExchangeError::RevisionFinalized(_)));
        assert!(update_calls(&api).is_empty());
    }

    #[tokio::test]
    async fn test_prepare_delete_with_force_definalizes_once() {
        let api = InMemoryExchange::new();
        let revision = finalized_revision(&api).await;

        let prepared = prepare_delete(&api, &revision, true).await.unwrap();

        assert!(!prepared.finalized);
        assert_eq!(update_calls(&api), vec![RevisionUpdate::finalized(false)]);
    }
}
