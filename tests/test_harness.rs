//! Test harness for engine integration tests.
//!
//! Provides fast engine configs, canned handlers and polling helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Notify;
use uuid::Uuid;

use hirequeue::aggregate::Aggregator;
use hirequeue::config::EngineConfig;
use hirequeue::engine::JobEngine;
use hirequeue::error::HandlerError;
use hirequeue::handlers::default_registry;
use hirequeue::poller::{poll_until_terminal, PollPolicy};
use hirequeue::scheduler::payload::DocumentRef;
use hirequeue::scheduler::{JobOutput, JobPayload, JobSnapshot, JobStatus};
use hirequeue::worker::{handler_fn, HandlerRegistry, JobContext, TaskHandler};

pub const DOCUMENT_BASE: &str = "documents://resumes";

/// Engine config with short timers for faster tests
pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default()
        .with_workers(2)
        .with_cancel_grace(Duration::from_millis(100))
        .with_retention(None)
        .with_drain_timeout(Duration::from_secs(5));
    config.idle_poll_interval = Duration::from_millis(10);
    config
}

/// Start an engine with the built-in handlers
pub fn start_default(config: EngineConfig) -> JobEngine {
    let aggregator = Arc::new(Aggregator::new());
    let registry = default_registry(aggregator.clone(), DOCUMENT_BASE);
    JobEngine::start(config, registry, aggregator)
}

/// Start an engine with a custom registry
pub fn start_with(config: EngineConfig, registry: HandlerRegistry) -> JobEngine {
    JobEngine::start(config, registry, Arc::new(Aggregator::new()))
}

/// Poll policy that finishes quickly
pub fn fast_policy() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(10), 500)
}

/// Poll a job until it reaches a terminal status
pub async fn wait_terminal(engine: &JobEngine, job_id: Uuid) -> JobSnapshot {
    poll_until_terminal(engine, job_id, fast_policy())
        .await
        .expect("job should reach a terminal status")
}

/// Wait until a job has been claimed by a worker
pub async fn wait_running(engine: &JobEngine, job_id: Uuid) {
    for _ in 0..500 {
        let job = engine.get_status(job_id).await.expect("job should exist");
        if job.status != JobStatus::Queued {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {} never left the queue", job_id);
}

pub fn render_payload(resume_id: &str) -> Value {
    json!({ "resume_id": resume_id })
}

pub fn judge_payload(interview_id: &str, role: &str, weight: f64, score: f64) -> Value {
    json!({
        "interview_id": interview_id,
        "judge_role": role,
        "weight": weight,
        "score": score,
    })
}

pub fn document(resume_id: &str) -> JobOutput {
    JobOutput::RenderPdf(DocumentRef {
        resume_id: resume_id.to_string(),
        template_id: None,
        uri: format!("{}/{}.pdf", DOCUMENT_BASE, resume_id),
        content_type: "application/pdf".to_string(),
    })
}

fn resume_id(payload: &JobPayload) -> String {
    match payload {
        JobPayload::RenderPdf(p) => p.resume_id.clone(),
        _ => "unknown".to_string(),
    }
}

/// Render handler that sleeps before succeeding
pub fn sleeping_renderer(delay: Duration) -> impl TaskHandler {
    handler_fn(move |payload: JobPayload, _ctx: JobContext| async move {
        tokio::time::sleep(delay).await;
        Ok(document(&resume_id(&payload)))
    })
}

/// Render handler that never returns and ignores cancellation
pub fn hanging_renderer() -> impl TaskHandler {
    handler_fn(|_payload: JobPayload, _ctx: JobContext| async move {
        std::future::pending::<Result<JobOutput, HandlerError>>().await
    })
}

/// Render handler that runs until its job is cancelled
pub fn cooperative_renderer() -> impl TaskHandler {
    handler_fn(|_payload: JobPayload, ctx: JobContext| async move {
        ctx.cancelled().await;
        Err::<JobOutput, HandlerError>(HandlerError::Cancelled)
    })
}

/// Render handler that reports `percent` then waits for `gate`
pub fn gated_renderer(gate: Arc<Notify>, percent: u8) -> impl TaskHandler {
    handler_fn(move |payload: JobPayload, ctx: JobContext| {
        let gate = gate.clone();
        async move {
            ctx.report_progress(percent).await;
            gate.notified().await;
            Ok(document(&resume_id(&payload)))
        }
    })
}
