use thiserror::Error;
use uuid::Uuid;

use crate::scheduler::job::{JobKind, JobStatus};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown job kind: {0}")]
    UnknownKind(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Queue is at capacity ({capacity} jobs)")]
    CapacityExceeded { capacity: usize },

    #[error("Engine is draining, new jobs are rejected")]
    Draining,

    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Job {id} already finished with status {status}")]
    AlreadyFinished { id: Uuid, status: JobStatus },

    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors on the judge-panel aggregation path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregateError {
    #[error("No weighted input for {0}: total weight is zero")]
    NoWeightedInput(String),

    #[error("Aggregation key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid contribution: {0}")]
    InvalidContribution(String),
}

/// Failure raised by a task handler while executing a job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("handler observed cancellation")]
    Cancelled,
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

impl From<AggregateError> for HandlerError {
    fn from(e: AggregateError) -> Self {
        HandlerError::Failed(e.to_string())
    }
}

#[derive(Error, Debug)]
#[error("No handler registered for kind {0}")]
pub struct MissingHandler(pub JobKind);

/// Illegal state machine move on a job record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Job {id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub id: Uuid,
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Job {job_id} still {last_status} after {attempts} polls")]
    TimedOut {
        job_id: Uuid,
        attempts: u32,
        last_status: JobStatus,
    },

    #[error("Status source error: {0}")]
    Source(String),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server rejected request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}
