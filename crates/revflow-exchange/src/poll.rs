//! Job status polling
//!
//! [`next_action`] is the pure transition function over job snapshots;
//! [`poll_job`] is the I/O loop that feeds it at a fixed interval under a
//! deadline and a cancellation token.

use crate::error::{ExchangeError, Result};
use revflow_cloud::{ExchangeApi, JobError, JobSnapshot, JobState};
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// What the poll loop does after observing a snapshot
#[derive(Debug)]
pub enum PollAction {
    /// Still `Waiting` or `InProgress`
    Continue,
    /// Reached `Completed`
    Succeed(JobSnapshot),
    /// Reached `Error` or `Cancelled`
    Fail(ExchangeError),
}

/// Decide the next step from one status snapshot
pub fn next_action(snapshot: JobSnapshot) -> PollAction {
    match snapshot.state {
        JobState::Waiting | JobState::InProgress => PollAction::Continue,
        JobState::Completed => PollAction::Succeed(snapshot),
        JobState::Error => PollAction::Fail(ExchangeError::JobFailed {
            message: join_job_errors(&snapshot.errors),
            job_id: snapshot.id,
        }),
        JobState::Cancelled => PollAction::Fail(ExchangeError::JobCancelled {
            job_id: snapshot.id,
        }),
    }
}

/// Join every per-cause error as `code: message`
pub fn join_job_errors(errors: &[JobError]) -> String {
    if errors.is_empty() {
        return "job reported ERROR without details".to_string();
    }
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Poll cadence and budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Block until the job reaches a terminal state
///
/// Returns the final snapshot on `Completed`. Fails with `PollTimeout` when
/// the budget runs out and with `Cancelled` when the token fires; polling
/// stops in both cases.
pub async fn poll_job<A>(
    api: &A,
    job_id: &str,
    config: PollConfig,
    cancel: &CancellationToken,
) -> Result<JobSnapshot>
where
    A: ExchangeApi + ?Sized,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExchangeError::Cancelled { operation: "job poll" }),
        result = tokio::time::timeout(
            config.timeout,
            poll_until_terminal(api, job_id, config.interval),
        ) => {
            match result {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(job_id, "Job did not finish within {:?}", config.timeout);
                    Err(ExchangeError::PollTimeout {
                        job_id: job_id.to_string(),
                        timeout: config.timeout,
                    })
                }
            }
        }
    }
}

async fn poll_until_terminal<A>(api: &A, job_id: &str, interval: Duration) -> Result<JobSnapshot>
where
    A: ExchangeApi + ?Sized,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        let snapshot = api.get_job(job_id).await?;
        tracing::debug!(
            job_id,
            attempt,
            state = %snapshot.state,
            terminal = snapshot.state.is_terminal(),
            "Polled job"
        );

        match next_action(snapshot) {
            PollAction::Continue => sleep(interval).await,
            PollAction::Succeed(snapshot) => return Ok(snapshot),
            PollAction::Fail(error) => return Err(error),
        }
    }
}
