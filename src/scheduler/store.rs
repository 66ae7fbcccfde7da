use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TransitionError;
use crate::scheduler::job::{Job, JobFailure, JobKind, JobSnapshot, JobStatus};
use crate::scheduler::payload::JobOutput;

const DEFAULT_MAX_JOBS: usize = 10_000;

/// Filter for listing jobs. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub owner_id: Option<String>,
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
}

impl JobFilter {
    fn matches(&self, job: &Job) -> bool {
        self.owner_id.as_deref().map_or(true, |o| job.owner_id == o)
            && self.status.map_or(true, |s| job.status == s)
            && self.kind.map_or(true, |k| job.kind == k)
    }
}

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Canonical record of every job the engine knows about.
#[derive(Debug)]
pub struct JobStore {
    jobs: HashMap<Uuid, Job>,
    max_jobs: usize,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_JOBS)
    }

    pub fn with_capacity(max_jobs: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            max_jobs,
        }
    }

    /// Insert a freshly submitted job. At capacity the finished job with the
    /// oldest `finished_at` makes room. Returns false if the id is already
    /// present or every record is still queued or running.
    pub fn insert(&mut self, job: Job) -> bool {
        if self.jobs.contains_key(&job.id) {
            return false;
        }
        if self.jobs.len() >= self.max_jobs && self.evict_oldest_finished().is_none() {
            return false;
        }
        self.jobs.insert(job.id, job);
        true
    }

    fn evict_oldest_finished(&mut self) -> Option<Job> {
        let id = self
            .jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .min_by_key(|job| (job.finished_at, job.id))
            .map(|job| job.id)?;
        tracing::debug!(job_id = %id, "Evicting oldest finished job to make room");
        self.jobs.remove(&id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn snapshot(&self, id: &Uuid) -> Option<JobSnapshot> {
        self.jobs.get(id).map(Job::snapshot)
    }

    fn job_mut(&mut self, id: &Uuid, to: JobStatus) -> Result<&mut Job, TransitionError> {
        // An unknown id is reported as a move out of `queued`, the only state
        // a purged or cancelled record could have been in.
        self.jobs.get_mut(id).ok_or(TransitionError {
            id: *id,
            from: JobStatus::Queued,
            to,
        })
    }

    pub fn mark_running(&mut self, id: &Uuid, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.job_mut(id, JobStatus::Running)?.start(at)
    }

    pub fn report_progress(&mut self, id: &Uuid, percent: u8) -> bool {
        self.jobs
            .get_mut(id)
            .is_some_and(|job| job.report_progress(percent))
    }

    /// Write the terminal state for a running job in one step.
    pub fn finish(
        &mut self,
        id: &Uuid,
        outcome: Result<JobOutput, JobFailure>,
        at: DateTime<Utc>,
    ) -> Result<JobStatus, TransitionError> {
        match outcome {
            Ok(output) => {
                self.job_mut(id, JobStatus::Completed)?.complete(output, at)?;
                Ok(JobStatus::Completed)
            }
            Err(failure) => {
                self.job_mut(id, JobStatus::Failed)?.fail(failure, at)?;
                Ok(JobStatus::Failed)
            }
        }
    }

    /// Drop a job that never started. Running and finished jobs are kept.
    pub fn remove_queued(&mut self, id: &Uuid) -> Option<Job> {
        if self.jobs.get(id)?.status != JobStatus::Queued {
            return None;
        }
        self.jobs.remove(id)
    }

    /// Jobs matching the filter, sorted chronologically by creation time.
    pub fn list(&self, filter: &JobFilter) -> Vec<&Job> {
        let mut jobs: Vec<&Job> = self.jobs.values().filter(|j| filter.matches(j)).collect();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        jobs
    }

    pub fn status_counts(&self) -> StatusCounts {
        self.jobs
            .values()
            .fold(StatusCounts::default(), |mut counts, job| {
                match job.status {
                    JobStatus::Queued => counts.queued += 1,
                    JobStatus::Running => counts.running += 1,
                    JobStatus::Completed => counts.completed += 1,
                    JobStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }

    /// Remove terminal jobs that finished before `cutoff`. Returns the number removed.
    pub fn purge_finished_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, job| {
            !(job.status.is_terminal() && job.finished_at.is_some_and(|at| at < cutoff))
        });
        before - self.jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// True when no record can be inserted: the store is at capacity and
    /// nothing in it has finished.
    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.max_jobs && !self.jobs.values().any(|j| j.status.is_terminal())
    }

    pub fn capacity(&self) -> usize {
        self.max_jobs
    }
}
