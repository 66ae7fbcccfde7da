use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::error::HandlerError;
use crate::scheduler::{JobFailure, JobKind, JobOutput, JobPayload, JobStatus};
use crate::worker::context::JobContext;
use crate::worker::registry::HandlerRegistry;

type HandlerTask = JoinHandle<Result<JobOutput, HandlerError>>;

/// Result of job execution
#[derive(Debug)]
pub struct ExecutionResult {
    pub job_id: Uuid,
    pub outcome: Result<JobOutput, JobFailure>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn status(&self) -> JobStatus {
        if self.outcome.is_ok() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        }
    }
}

/// Runs a single job's handler with failure isolation.
///
/// The handler runs in its own tokio task so that:
/// - a returned error becomes a `handler` failure
/// - a panic is caught at the join and becomes a `handler` failure
/// - the kind's time budget is enforced by aborting the task
/// - a cancellation request gets `cancel_grace` to wind down before the task
///   is aborted, never past the end of the time budget
///
/// Aborting only takes effect at the handler's next await point. Work the
/// handler already handed to an external service may keep running.
#[derive(Debug, Clone)]
pub struct JobExecutor {
    registry: Arc<HandlerRegistry>,
    cancel_grace: Duration,
}

impl JobExecutor {
    pub fn new(registry: Arc<HandlerRegistry>, cancel_grace: Duration) -> Self {
        Self {
            registry,
            cancel_grace,
        }
    }

    /// Execute a job's handler within `budget`.
    pub async fn execute(
        &self,
        payload: JobPayload,
        ctx: JobContext,
        budget: Duration,
    ) -> ExecutionResult {
        let job_id = ctx.job_id();
        let kind = ctx.kind();
        let started = Instant::now();
        tracing::info!(
            job_id = %job_id,
            kind = %kind,
            budget_ms = budget.as_millis() as u64,
            "Executing job"
        );

        let handler = match self.registry.lookup(kind) {
            Ok(handler) => handler,
            Err(e) => {
                return Self::finish(job_id, started, Err(JobFailure::handler(e.to_string())));
            }
        };

        let token = ctx.cancellation_token().clone();
        let mut task: HandlerTask = tokio::spawn(async move { handler.run(payload, ctx).await });

        let outcome = tokio::select! {
            joined = &mut task => Self::process_join(job_id, kind, joined),
            _ = token.cancelled() => self.wind_down(job_id, &mut task, started, budget).await,
            _ = tokio::time::sleep(budget) => {
                token.cancel();
                task.abort();
                tracing::warn!(
                    job_id = %job_id,
                    kind = %kind,
                    budget_ms = budget.as_millis() as u64,
                    "Job exceeded its time budget"
                );
                Err(JobFailure::timeout(budget))
            }
        };

        Self::finish(job_id, started, outcome)
    }

    fn finish(
        job_id: Uuid,
        started: Instant,
        outcome: Result<JobOutput, JobFailure>,
    ) -> ExecutionResult {
        let elapsed = started.elapsed();
        match &outcome {
            Ok(_) => tracing::info!(
                job_id = %job_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Job completed"
            ),
            Err(failure) => tracing::info!(
                job_id = %job_id,
                elapsed_ms = elapsed.as_millis() as u64,
                failure_kind = %failure.kind,
                error = %failure.message,
                "Job failed"
            ),
        }
        ExecutionResult {
            job_id,
            outcome,
            elapsed,
        }
    }

    /// Give a cancelled handler `cancel_grace` to return, then abort it.
    ///
    /// The grace period is cut short by the time budget. A handler still
    /// running when the budget runs out is recorded as a timeout.
    async fn wind_down(
        &self,
        job_id: Uuid,
        task: &mut HandlerTask,
        started: Instant,
        budget: Duration,
    ) -> Result<JobOutput, JobFailure> {
        let remaining = budget.saturating_sub(started.elapsed());
        let grace = self.cancel_grace.min(remaining);
        if tokio::time::timeout(grace, &mut *task).await.is_ok() {
            tracing::debug!(job_id = %job_id, "Handler stopped after cancellation");
            return Err(JobFailure::cancelled());
        }

        task.abort();
        if remaining <= self.cancel_grace {
            tracing::warn!(
                job_id = %job_id,
                budget_ms = budget.as_millis() as u64,
                "Handler ignored cancellation past its time budget, aborting"
            );
            return Err(JobFailure::timeout(budget));
        }
        tracing::warn!(
            job_id = %job_id,
            grace_ms = self.cancel_grace.as_millis() as u64,
            "Handler ignored cancellation, aborting"
        );
        Err(JobFailure::cancelled())
    }

    fn process_join(
        job_id: Uuid,
        kind: JobKind,
        joined: Result<Result<JobOutput, HandlerError>, JoinError>,
    ) -> Result<JobOutput, JobFailure> {
        match joined {
            Ok(Ok(output)) if output.kind() == kind => Ok(output),
            Ok(Ok(output)) => Err(JobFailure::handler(format!(
                "handler returned {} output for a {} job",
                output.kind(),
                kind
            ))),
            Ok(Err(HandlerError::Cancelled)) => Err(JobFailure::cancelled()),
            Ok(Err(e)) => Err(JobFailure::handler(e.to_string())),
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!(job_id = %job_id, panic = %message, "Handler panicked");
                Err(JobFailure::handler(format!("handler panicked: {}", message)))
            }
            Err(_) => Err(JobFailure::cancelled()),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
