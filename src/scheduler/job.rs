use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;
use crate::scheduler::payload::{JobOutput, JobPayload};

/// Category of work; selects the handler that executes a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ParseTemplate,
    RenderPdf,
    ScoreAts,
    EvaluateInterview,
    JudgeEvaluate,
}

impl JobKind {
    pub const ALL: [JobKind; 5] = [
        JobKind::ParseTemplate,
        JobKind::RenderPdf,
        JobKind::ScoreAts,
        JobKind::EvaluateInterview,
        JobKind::JudgeEvaluate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ParseTemplate => "parse_template",
            JobKind::RenderPdf => "render_pdf",
            JobKind::ScoreAts => "score_ats",
            JobKind::EvaluateInterview => "evaluate_interview",
            JobKind::JudgeEvaluate => "judge_evaluate",
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// Why a job ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Handler,
    Timeout,
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Handler => write!(f, "handler"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn handler(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: FailureKind::Handler,
            message: if message.trim().is_empty() {
                "handler failed without a message".to_string()
            } else {
                message
            },
        }
    }

    pub fn timeout(budget: std::time::Duration) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("job exceeded its {}ms execution budget", budget.as_millis()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: "job was cancelled".to_string(),
        }
    }
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: JobKind,
    pub owner_id: String,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub result: Option<JobOutput>,
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(owner_id: impl Into<String>, payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: payload.kind(),
            owner_id: owner_id.into(),
            payload,
            status: JobStatus::Queued,
            progress: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    fn transition_error(&self, to: JobStatus) -> TransitionError {
        TransitionError {
            id: self.id,
            from: self.status,
            to,
        }
    }

    /// `queued -> running`. Stamps `started_at` and resets progress to 0.
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != JobStatus::Queued {
            return Err(self.transition_error(JobStatus::Running));
        }
        self.status = JobStatus::Running;
        self.started_at = Some(at);
        self.progress = Some(0);
        Ok(())
    }

    /// Record progress while running. Values below the last report are ignored.
    pub fn report_progress(&mut self, percent: u8) -> bool {
        if self.status != JobStatus::Running {
            return false;
        }
        let percent = percent.min(100);
        match self.progress {
            Some(current) if current >= percent => false,
            _ => {
                self.progress = Some(percent);
                true
            }
        }
    }

    /// `running -> completed` with the handler's output.
    pub fn complete(&mut self, output: JobOutput, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != JobStatus::Running {
            return Err(self.transition_error(JobStatus::Completed));
        }
        self.status = JobStatus::Completed;
        self.progress = Some(100);
        self.result = Some(output);
        self.finished_at = Some(at);
        Ok(())
    }

    /// `running -> failed`. Progress keeps its last reported value.
    pub fn fail(&mut self, failure: JobFailure, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status != JobStatus::Running {
            return Err(self.transition_error(JobStatus::Failed));
        }
        self.status = JobStatus::Failed;
        self.error = Some(failure);
        self.finished_at = Some(at);
        Ok(())
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_id: self.id,
            kind: self.kind,
            owner_id: self.owner_id.clone(),
            status: self.status,
            progress: self.progress,
            result: self.result.clone(),
            error: self.error.as_ref().map(|f| f.to_string()),
            error_kind: self.error.as_ref().map(|f| f.kind),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Point-in-time view of a job returned to pollers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub owner_id: String,
    pub status: JobStatus,
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
