pub mod job;
pub mod payload;
pub mod queue;
pub mod store;

pub use job::{FailureKind, Job, JobFailure, JobKind, JobSnapshot, JobStatus};
pub use payload::{JobOutput, JobPayload};
pub use queue::JobQueue;
pub use store::{JobFilter, JobStore, StatusCounts};
