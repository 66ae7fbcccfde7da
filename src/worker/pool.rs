use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::engine::EngineShared;
use crate::worker::context::JobContext;
use crate::worker::executor::JobExecutor;

/// Fixed set of worker tasks pulling from the shared queue.
#[derive(Debug)]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers. Must be called from within a tokio runtime.
    pub(crate) fn spawn(size: usize, shared: Arc<EngineShared>, executor: JobExecutor) -> Self {
        let handles = (0..size.max(1))
            .map(|worker| {
                let shared = shared.clone();
                let executor = executor.clone();
                tokio::spawn(async move {
                    Self::worker_loop(worker, shared, executor).await;
                })
            })
            .collect();
        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to exit. Safe to abandon midway: workers not yet
    /// joined stay in the pool.
    pub async fn join(&mut self) {
        while let Some(handle) = self.handles.last_mut() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
            self.handles.pop();
        }
    }

    /// Abort workers that have not exited yet.
    pub fn abort_all(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }

    /// Worker loop: claim, execute, record, repeat.
    ///
    /// Claiming moves the job to `running` before the handler is invoked.
    /// When the queue is empty the worker parks on the engine's notifier,
    /// with a periodic tick as a fallback. Once the engine is shutting down
    /// the worker keeps draining the queue and exits when it is empty.
    async fn worker_loop(worker: usize, shared: Arc<EngineShared>, executor: JobExecutor) {
        tracing::debug!(worker, "Worker started");
        let mut idle = tokio::time::interval(shared.config.idle_poll_interval);

        loop {
            if let Some(claim) = shared.claim_next(worker).await {
                let ctx = JobContext::new(
                    claim.job_id,
                    claim.kind,
                    claim.owner_id,
                    claim.cancellation,
                    shared.store.clone(),
                );
                let budget = shared.config.timeout_for(claim.kind);
                let result = executor.execute(claim.payload, ctx, budget).await;
                shared.record_result(worker, result).await;
                continue;
            }

            if shared.shutdown.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = shared.notify.notified() => {}
                _ = shared.shutdown.cancelled() => {}
                _ = idle.tick() => {}
            }
        }

        tracing::debug!(worker, "Worker stopped");
    }
}
