//! Client-side polling discipline.
//!
//! Status reads never block, so callers poll: fixed interval, bounded
//! attempts, and a timeout of their own that is distinct from job failure.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::engine::JobEngine;
use crate::error::{EngineError, PollError};
use crate::scheduler::JobSnapshot;

/// Anything that can answer "what is the state of job X".
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: Uuid) -> Result<JobSnapshot, PollError>;
}

#[async_trait]
impl StatusSource for JobEngine {
    async fn fetch_status(&self, job_id: Uuid) -> Result<JobSnapshot, PollError> {
        self.get_status(job_id).await.map_err(|e| match e {
            EngineError::NotFound(id) => PollError::NotFound(id),
            other => PollError::Source(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 30,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// Poll until the job reaches a terminal status.
///
/// Returns the terminal snapshot, whether `completed` or `failed`. Running
/// out of attempts yields [`PollError::TimedOut`] carrying the last status
/// seen; the job itself keeps running.
pub async fn poll_until_terminal<S>(
    source: &S,
    job_id: Uuid,
    policy: PollPolicy,
) -> Result<JobSnapshot, PollError>
where
    S: StatusSource + ?Sized,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_status = None;

    for attempt in 1..=attempts {
        let snapshot = source.fetch_status(job_id).await?;
        if snapshot.is_terminal() {
            tracing::debug!(job_id = %job_id, attempt, status = %snapshot.status, "Job reached terminal status");
            return Ok(snapshot);
        }
        last_status = Some(snapshot.status);
        if attempt < attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(PollError::TimedOut {
        job_id,
        attempts,
        last_status: last_status.unwrap_or(crate::scheduler::JobStatus::Queued),
    })
}
