//! Job submission

use crate::error::{ExchangeError, Result};
use revflow_cloud::{CreatedJob, ExchangeApi, JobDetails, JobRequest, JobType, RevisionId};

/// Create a job for one asset and, unless it waits on an upload, start it
///
/// Signed-URL imports are returned unstarted; the upload streamer starts them
/// once the content is in place.
pub async fn submit_job<A>(
    api: &A,
    revision: &RevisionId,
    details: JobDetails,
) -> Result<CreatedJob>
where
    A: ExchangeApi + ?Sized,
{
    let job_type = details.job_type();
    let request = JobRequest {
        revision: revision.clone(),
        details,
    };

    let job = api
        .create_job(&request)
        .await
        .map_err(|source| ExchangeError::Submission { job_type, source })?;
    tracing::debug!(job_id = %job.id, %job_type, "Created job in revision {}", revision);

    if job_type != JobType::ImportAssetFromSignedUrl {
        start_job(api, &job).await?;
    }

    Ok(job)
}

/// Ask the backend to start a created job
pub async fn start_job<A>(api: &A, job: &CreatedJob) -> Result<()>
where
    A: ExchangeApi + ?Sized,
{
    api.start_job(&job.id)
        .await
        .map_err(|source| ExchangeError::Submission {
            job_type: job.job_type,
            source,
        })?;
    tracing::debug!(job_id = %job.id, "Started job");
    Ok(())
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

    #[tokio::test]
    async fn test_import_job_is_started_immediately() {
        let api = InMemoryExchange::new();
        let id = revision(&api).await;

        let job = submit_job(
            &api,
            &id,
            JobDetails::ImportAssetsFromS3 {
                bucket: "b".to_string(),
                key: "k".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            api.count_calls(|c| *c == ApiCall::StartJob(job.id.clone())),
            1
        );
    }

    #[tokio::test]
    async fn test_signed_url_job_is_left_unstarted() {
        let api = InMemoryExchange::new();
        let id = revision(&api).await;

        let job = submit_job(
            &api,
            &id,
            JobDetails::ImportAssetFromSignedUrl {
                asset_name: "data.csv".to_string(),
                md5_hash: "1B2M2Y8AsgTpgAmY7PhCfg==".to_string(),
            },
        )
        .await
        .unwrap();

        assert!(job.signed_upload.is_some());
        assert_eq!(api.count_calls(|c| matches!(c, ApiCall::StartJob(_))), 0);
    }

    #[tokio::test]
    async fn test_create_failure_is_submission_error() {
        let api = InMemoryExchange::new();
        let id = revision(&api).await;
        api.fail_next_create_job("throttled");

        let err = submit_job(&api, &id, JobDetails::ImportAssetsFromS3 {
            bucket: "b".to_string(),
            key: "k".to_string(),
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ExchangeError::Submission {
                job_type: JobType::ImportAssetsFromS3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_start_failure_is_submission_error() {
        let api = InMemoryExchange::new();
        let id = revision(&api).await;
        api.fail_next_start_job("denied");

        let err = submit_job(&api, &id, JobDetails::CreateS3DataAccessFromS3Bucket {
            bucket: "b".to_string(),
            key_prefixes: vec![],
            keys: vec![],
            kms_keys_to_grant: vec![],
        })
        .await
        .unwrap_err();

        assert!(matches!(err, ExchangeError::Submission { .. }));
        assert!(err.to_string().contains("denied"));
    }
}
