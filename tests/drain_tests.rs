mod test_harness;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use hirequeue::error::EngineError;
use hirequeue::scheduler::{FailureKind, JobKind, JobStatus};
use hirequeue::worker::HandlerRegistry;
use test_harness::*;

/// Test that a draining engine rejects new submissions.
#[tokio::test]
async fn test_drain_rejects_new_jobs() {
    let engine = start_default(test_config());
    engine.shutdown().await;

    assert!(engine.is_draining());
    let err = engine
        .submit(JobKind::RenderPdf, render_payload("resume-1"), "user-1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Draining));
    assert!(engine.stats().await.draining);
}

/// Test that queued and running jobs are all finished before shutdown returns.
#[tokio::test]
async fn test_drain_finishes_queued_jobs() {
    let registry = HandlerRegistry::builder()
        .register(
            JobKind::RenderPdf,
            sleeping_renderer(Duration::from_millis(20)),
        )
        .build();
    let engine = start_with(test_config().with_workers(1), registry);

    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(
            engine
                .submit(JobKind::RenderPdf, render_payload(&format!("r-{}", i)), "user-1")
                .await
                .unwrap(),
        );
    }

    engine.shutdown().await;

    for id in ids {
        let job = engine.get_status(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed, "job {} not drained", id);
    }
    assert_eq!(engine.stats().await.queue_depth, 0);
}

/// Test that a running job still completes after the drain starts.
#[tokio::test]
async fn test_drain_waits_for_running_job() {
    let gate = Arc::new(Notify::new());
    let registry = HandlerRegistry::builder()
        .register(JobKind::RenderPdf, gated_renderer(gate.clone(), 50))
        .build();
    let engine = start_with(test_config().with_workers(1), registry);

    let id = engine
        .submit(JobKind::RenderPdf, render_payload("resume-1"), "user-1")
        .await
        .unwrap();
    wait_running(&engine, id).await;

    let shutdown = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.shutdown().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutdown.is_finished(), "shutdown must wait for the running job");

    gate.notify_one();
    shutdown.await.unwrap();
    assert_eq!(
        engine.get_status(id).await.unwrap().status,
        JobStatus::Completed
    );
}

/// Test that jobs still running at the drain deadline are cancelled.
#[tokio::test]
async fn test_drain_timeout_cancels_running_job() {
    let registry = HandlerRegistry::builder()
        .register(JobKind::RenderPdf, hanging_renderer())
        .build();
    let engine = start_with(
        test_config()
            .with_workers(1)
            .with_drain_timeout(Duration::from_millis(200)),
        registry,
    );

    let stuck = engine
        .submit(JobKind::RenderPdf, render_payload("resume-1"), "user-1")
        .await
        .unwrap();
    wait_running(&engine, stuck).await;
    let waiting = engine
        .submit(JobKind::RenderPdf, render_payload("resume-2"), "user-1")
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), engine.shutdown())
        .await
        .expect("shutdown must respect the drain timeout");

    let job = engine.get_status(stuck).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error_kind, Some(FailureKind::Cancelled));

    // Queued work is left as it was.
    let job = engine.get_status(waiting).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);
}

/// Test that calling shutdown more than once is harmless.
#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let engine = start_default(test_config());
    let other = engine.clone();

    tokio::join!(engine.shutdown(), other.shutdown());
    engine.shutdown().await;

    assert!(engine.is_draining());
    assert!(other.is_draining());
}
