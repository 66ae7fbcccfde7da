use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::aggregate::{AggregatedView, Aggregator, CompletionRule, EvaluationContribution};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::scheduler::{
    Job, JobFailure, JobFilter, JobKind, JobPayload, JobQueue, JobSnapshot, JobStatus, JobStore,
    StatusCounts,
};
use crate::worker::executor::{ExecutionResult, JobExecutor};
use crate::worker::pool::WorkerPool;
use crate::worker::registry::HandlerRegistry;

/// A job handed to a worker, already marked `running`.
#[derive(Debug)]
pub(crate) struct ClaimedJob {
    pub job_id: Uuid,
    pub kind: JobKind,
    pub owner_id: String,
    pub payload: JobPayload,
    pub cancellation: CancellationToken,
}

/// State shared between the engine handle and its workers.
///
/// Lock order is always `queue`, then `store`, then `running`.
#[derive(Debug)]
pub(crate) struct EngineShared {
    pub config: EngineConfig,
    pub registry: Arc<HandlerRegistry>,
    pub store: Arc<RwLock<JobStore>>,
    pub queue: Mutex<JobQueue>,
    /// Cancellation tokens of running jobs.
    pub running: Mutex<HashMap<Uuid, CancellationToken>>,
    pub notify: Notify,
    pub shutdown: CancellationToken,
    pub draining: AtomicBool,
}

impl EngineShared {
    /// Pop the next queued job and mark it running.
    ///
    /// The pop and the `queued -> running` transition happen under the queue
    /// lock, so no job is handed out twice and `started_at` follows dequeue order.
    pub(crate) async fn claim_next(&self, worker: usize) -> Option<ClaimedJob> {
        let mut queue = self.queue.lock().await;
        loop {
            let (kind, job_id) = queue.pop()?;
            let mut store = self.store.write().await;
            if let Err(e) = store.mark_running(&job_id, Utc::now()) {
                tracing::warn!(job_id = %job_id, error = %e, "Skipping unclaimable job");
                continue;
            }
            let Some(job) = store.get(&job_id) else {
                continue;
            };
            let cancellation = CancellationToken::new();
            let claim = ClaimedJob {
                job_id,
                kind,
                owner_id: job.owner_id.clone(),
                payload: job.payload.clone(),
                cancellation: cancellation.clone(),
            };
            self.running.lock().await.insert(job_id, cancellation);
            tracing::debug!(worker, job_id = %job_id, kind = %kind, "Job claimed");
            return Some(claim);
        }
    }

    /// Write a worker's terminal outcome. Only the owning worker calls this.
    pub(crate) async fn record_result(&self, worker: usize, result: ExecutionResult) {
        let job_id = result.job_id;
        {
            let mut store = self.store.write().await;
            match store.finish(&job_id, result.outcome, Utc::now()) {
                Ok(status) => {
                    tracing::info!(worker, job_id = %job_id, status = %status, "Job finished")
                }
                Err(e) => {
                    tracing::warn!(worker, job_id = %job_id, error = %e, "Dropped terminal write")
                }
            }
        }
        self.running.lock().await.remove(&job_id);
    }
}

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job was still queued and has been removed.
    Removed,
    /// The job is running; its handler has been signalled.
    Signalled,
}

/// Engine-wide counters for health reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub workers: usize,
    pub draining: bool,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub queue_depth_by_kind: BTreeMap<JobKind, usize>,
    pub jobs: StatusCounts,
    pub registered_kinds: Vec<JobKind>,
    pub panels: usize,
}

/// The asynchronous job engine.
///
/// Owns the job store, the intake queue, the worker pool and the judge-panel
/// aggregator. Cheap to clone; all clones share the same engine.
///
/// Lifecycle:
/// 1. [`JobEngine::start`] spawns the workers (and the retention sweeper if
///    retention is configured) on the current tokio runtime.
/// 2. Clients [`submit`](JobEngine::submit) jobs and poll
///    [`get_status`](JobEngine::get_status) until a terminal status.
/// 3. [`JobEngine::shutdown`] rejects new submissions, lets the workers drain
///    the queue and finish in-flight jobs, and cancels whatever is still
///    running after `drain_timeout`.
#[derive(Clone)]
pub struct JobEngine {
    shared: Arc<EngineShared>,
    aggregator: Arc<Aggregator>,
    workers: Arc<Mutex<Option<WorkerPool>>>,
    worker_count: usize,
    sweeper: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl JobEngine {
    /// Build the engine and spawn its workers. Must be called inside a tokio runtime.
    pub fn start(
        config: EngineConfig,
        registry: HandlerRegistry,
        aggregator: Arc<Aggregator>,
    ) -> Self {
        let registry = Arc::new(registry);
        let shared = Arc::new(EngineShared {
            store: Arc::new(RwLock::new(JobStore::with_capacity(config.max_jobs))),
            queue: Mutex::new(JobQueue::with_capacity(config.queue_capacity)),
            running: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            shutdown: CancellationToken::new(),
            draining: AtomicBool::new(false),
            registry: registry.clone(),
            config,
        });

        let executor = JobExecutor::new(registry.clone(), shared.config.cancel_grace);
        let pool = WorkerPool::spawn(shared.config.worker_count, shared.clone(), executor);
        let worker_count = pool.size();
        let sweeper = shared
            .config
            .retention
            .map(|retention| Self::spawn_sweeper(shared.clone(), aggregator.clone(), retention));

        tracing::info!(
            workers = worker_count,
            queue_capacity = shared.config.queue_capacity,
            kinds = ?registry.kinds(),
            "Job engine started"
        );

        Self {
            shared,
            aggregator,
            workers: Arc::new(Mutex::new(Some(pool))),
            worker_count,
            sweeper: Arc::new(Mutex::new(sweeper)),
        }
    }

    fn spawn_sweeper(
        shared: Arc<EngineShared>,
        aggregator: Arc<Aggregator>,
        retention: std::time::Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = shared.config.retention_sweep_interval;
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        Self::purge(&shared, &aggregator, retention).await;
                    }
                    _ = shared.shutdown.cancelled() => break,
                }
            }
        })
    }

    /// Drop terminal jobs and idle panels older than the retention window.
    /// Returns the number of jobs purged.
    async fn purge(
        shared: &EngineShared,
        aggregator: &Aggregator,
        retention: std::time::Duration,
    ) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;
        let purged = shared.store.write().await.purge_finished_before(cutoff);
        let panels = aggregator.purge_idle_before(cutoff).await;
        if purged > 0 || panels > 0 {
            tracing::info!(purged, panels, "Expired jobs and idle panels purged");
        }
        purged
    }

    /// Submit a job from a raw JSON payload.
    ///
    /// Fails without creating a job when the kind has no handler
    /// (`UnknownKind`), the payload does not decode or validate
    /// (`InvalidPayload`), the queue or store is full (`CapacityExceeded`), or
    /// the engine is shutting down (`Draining`).
    pub async fn submit(
        &self,
        kind: JobKind,
        payload: serde_json::Value,
        owner_id: &str,
    ) -> Result<Uuid> {
        if !self.shared.registry.contains(kind) {
            return Err(EngineError::UnknownKind(kind.to_string()));
        }
        let payload = JobPayload::from_json(kind, payload).map_err(EngineError::InvalidPayload)?;
        self.submit_payload(payload, owner_id).await
    }

    /// Submit with the kind given as its wire name (e.g. `"render_pdf"`).
    pub async fn submit_named(
        &self,
        kind: &str,
        payload: serde_json::Value,
        owner_id: &str,
    ) -> Result<Uuid> {
        let kind: JobKind = kind.parse().map_err(EngineError::UnknownKind)?;
        self.submit(kind, payload, owner_id).await
    }

    /// Submit an already-typed payload.
    pub async fn submit_payload(&self, payload: JobPayload, owner_id: &str) -> Result<Uuid> {
        let kind = payload.kind();
        let handler = self
            .shared
            .registry
            .lookup(kind)
            .map_err(|_| EngineError::UnknownKind(kind.to_string()))?;
        if owner_id.trim().is_empty() {
            return Err(EngineError::InvalidPayload(
                "owner_id must not be empty".to_string(),
            ));
        }
        payload.validate().map_err(EngineError::InvalidPayload)?;
        handler
            .validate(&payload)
            .map_err(EngineError::InvalidPayload)?;

        let job = Job::new(owner_id, payload);
        let job_id = job.id;
        {
            let mut queue = self.shared.queue.lock().await;
            if self.shared.draining.load(Ordering::SeqCst) {
                return Err(EngineError::Draining);
            }
            if queue.is_full() {
                tracing::warn!(kind = %kind, capacity = queue.capacity(), "Queue at capacity, job rejected");
                return Err(EngineError::CapacityExceeded {
                    capacity: queue.capacity(),
                });
            }
            let mut store = self.shared.store.write().await;
            if !store.insert(job) {
                tracing::warn!(kind = %kind, capacity = store.capacity(), "Job store at capacity, job rejected");
                return Err(EngineError::CapacityExceeded {
                    capacity: store.capacity(),
                });
            }
            queue.push(kind, job_id);
        }
        self.shared.notify.notify_one();

        tracing::info!(job_id = %job_id, kind = %kind, owner_id, "Job submitted");
        Ok(job_id)
    }

    /// Current state of a job. Never blocks on handler execution.
    pub async fn get_status(&self, job_id: Uuid) -> Result<JobSnapshot> {
        self.shared
            .store
            .read()
            .await
            .snapshot(&job_id)
            .ok_or(EngineError::NotFound(job_id))
    }

    /// Cancel a job.
    ///
    /// A queued job is removed outright and later reads return `NotFound`. A
    /// running job has its cancellation token triggered; its worker records
    /// `failed` with a `cancelled` error once the handler stops or the grace
    /// period runs out.
    pub async fn cancel(&self, job_id: Uuid) -> Result<CancelOutcome> {
        let mut queue = self.shared.queue.lock().await;
        let mut store = self.shared.store.write().await;
        let status = store
            .get(&job_id)
            .map(|job| job.status)
            .ok_or(EngineError::NotFound(job_id))?;

        match status {
            JobStatus::Queued => {
                queue.remove(&job_id);
                store.remove_queued(&job_id);
                tracing::info!(job_id = %job_id, "Queued job cancelled");
                Ok(CancelOutcome::Removed)
            }
            JobStatus::Running => {
                if let Some(token) = self.shared.running.lock().await.get(&job_id) {
                    token.cancel();
                }
                tracing::info!(job_id = %job_id, "Cancellation signalled to running job");
                Ok(CancelOutcome::Signalled)
            }
            status => Err(EngineError::AlreadyFinished { id: job_id, status }),
        }
    }

    /// Jobs matching `filter`, oldest first.
    pub async fn list_jobs(&self, filter: &JobFilter) -> Vec<JobSnapshot> {
        self.shared
            .store
            .read()
            .await
            .list(filter)
            .into_iter()
            .map(Job::snapshot)
            .collect()
    }

    /// Record a judge's contribution directly, without going through a job.
    pub async fn submit_contribution(
        &self,
        aggregation_key: &str,
        judge_role: &str,
        weight: f64,
        score: f64,
    ) -> Result<Uuid> {
        let contribution = self
            .aggregator
            .submit_contribution(aggregation_key, judge_role, weight, score)
            .await?;
        Ok(contribution.id)
    }

    pub async fn get_aggregated(&self, aggregation_key: &str) -> Result<AggregatedView> {
        Ok(self.aggregator.get_aggregated(aggregation_key).await?)
    }

    pub async fn configure_panel(&self, aggregation_key: &str, rule: CompletionRule) {
        self.aggregator.configure(aggregation_key, rule).await
    }

    pub async fn finalize_panel(&self, aggregation_key: &str) -> Result<AggregatedView> {
        Ok(self.aggregator.finalize(aggregation_key).await?)
    }

    pub async fn contributions(&self, aggregation_key: &str) -> Result<Vec<EvaluationContribution>> {
        Ok(self.aggregator.contributions(aggregation_key).await?)
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn is_draining(&self) -> bool {
        self.shared.draining.load(Ordering::SeqCst)
    }

    /// Purge terminal jobs and idle panels older than the retention window
    /// now. Returns the number of jobs purged.
    pub async fn purge_expired(&self) -> usize {
        match self.shared.config.retention {
            Some(retention) => Self::purge(&self.shared, &self.aggregator, retention).await,
            None => 0,
        }
    }

    pub async fn stats(&self) -> EngineStats {
        let (queue_depth, queue_capacity, queue_depth_by_kind): (usize, usize, BTreeMap<_, _>) = {
            let queue = self.shared.queue.lock().await;
            (
                queue.len(),
                queue.capacity(),
                queue.depth_by_kind().into_iter().collect(),
            )
        };
        let jobs = self.shared.store.read().await.status_counts();

        EngineStats {
            workers: self.worker_count,
            draining: self.is_draining(),
            queue_depth,
            queue_capacity,
            queue_depth_by_kind,
            jobs,
            registered_kinds: self.shared.registry.kinds(),
            panels: self.aggregator.panel_count().await,
        }
    }

    /// Stop accepting jobs and drain.
    ///
    /// Workers finish every queued and running job. If that takes longer than
    /// `drain_timeout`, running jobs are marked `failed` / `cancelled` and the
    /// workers are aborted; jobs still queued at that point are left queued.
    pub async fn shutdown(&self) {
        {
            let _queue = self.shared.queue.lock().await;
            if self.shared.draining.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        tracing::info!("Draining job engine");
        self.shared.shutdown.cancel();
        self.shared.notify.notify_waiters();

        if let Some(sweeper) = self.sweeper.lock().await.take() {
            sweeper.abort();
        }

        let Some(mut pool) = self.workers.lock().await.take() else {
            return;
        };
        let drain_timeout = self.shared.config.drain_timeout;
        if tokio::time::timeout(drain_timeout, pool.join()).await.is_ok() {
            tracing::info!("Job engine drained");
            return;
        }

        tracing::warn!(
            drain_timeout_ms = drain_timeout.as_millis() as u64,
            "Drain timed out, cancelling running jobs"
        );
        pool.abort_all();
        let mut store = self.shared.store.write().await;
        let mut running = self.shared.running.lock().await;
        for (job_id, token) in running.drain() {
            token.cancel();
            if let Err(e) = store.finish(&job_id, Err(JobFailure::cancelled()), Utc::now()) {
                tracing::warn!(job_id = %job_id, error = %e, "Could not record forced cancellation");
            }
        }
    }
}
