use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::scheduler::JobKind;

/// Configuration for the job engine.
///
/// The limits here bound what handlers may consume. Worker count caps
/// concurrency; per-kind timeouts cap how long one job may hold a worker.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of concurrent worker tasks.
    pub worker_count: usize,
    /// Maximum number of queued (not yet started) jobs.
    pub queue_capacity: usize,
    /// Maximum number of job records retained, terminal ones included.
    pub max_jobs: usize,
    /// Execution budget for kinds without an entry in `kind_timeouts`.
    pub default_timeout: Duration,
    /// Execution budget per kind.
    pub kind_timeouts: HashMap<JobKind, Duration>,
    /// How long a cancelled handler may keep running before it is aborted.
    pub cancel_grace: Duration,
    /// Fallback wake-up interval for idle workers.
    pub idle_poll_interval: Duration,
    /// How long terminal jobs stay readable. `None` keeps them forever.
    pub retention: Option<Duration>,
    /// How often the retention sweeper runs.
    pub retention_sweep_interval: Duration,
    /// How long shutdown waits for queued and running jobs to finish.
    pub drain_timeout: Duration,
}

fn default_kind_timeouts() -> HashMap<JobKind, Duration> {
    HashMap::from([
        (JobKind::ParseTemplate, Duration::from_secs(30)),
        (JobKind::RenderPdf, Duration::from_secs(60)),
        (JobKind::ScoreAts, Duration::from_secs(120)),
        (JobKind::EvaluateInterview, Duration::from_secs(120)),
        (JobKind::JudgeEvaluate, Duration::from_secs(30)),
    ])
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1_000,
            max_jobs: 10_000,
            default_timeout: Duration::from_secs(60),
            kind_timeouts: default_kind_timeouts(),
            cancel_grace: Duration::from_secs(2),
            idle_poll_interval: Duration::from_millis(250),
            retention: Some(Duration::from_secs(24 * 60 * 60)),
            retention_sweep_interval: Duration::from_secs(60),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_max_jobs(mut self, max_jobs: usize) -> Self {
        self.max_jobs = max_jobs;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_kind_timeout(mut self, kind: JobKind, timeout: Duration) -> Self {
        self.kind_timeouts.insert(kind, timeout);
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn with_retention(mut self, retention: Option<Duration>) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Execution budget for a kind.
    pub fn timeout_for(&self, kind: JobKind) -> Duration {
        self.kind_timeouts
            .get(&kind)
            .copied()
            .unwrap_or(self.default_timeout)
    }
}

/// Configuration for the HTTP server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Base URI under which rendered documents are referenced.
    pub document_base_uri: String,
    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            document_base_uri: "documents://resumes".to_string(),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_default() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.worker_count, 4);
        assert_eq!(cfg.queue_capacity, 1_000);
        assert_eq!(cfg.max_jobs, 10_000);
        assert_eq!(cfg.default_timeout, Duration::from_secs(60));
        assert_eq!(cfg.cancel_grace, Duration::from_secs(2));
        assert_eq!(cfg.retention, Some(Duration::from_secs(86_400)));
        assert_eq!(cfg.kind_timeouts.len(), JobKind::ALL.len());
    }

    #[test]
    fn timeout_for_uses_kind_budget() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.timeout_for(JobKind::ParseTemplate), Duration::from_secs(30));
        assert_eq!(cfg.timeout_for(JobKind::ScoreAts), Duration::from_secs(120));
    }

    #[test]
    fn timeout_for_falls_back_to_default() {
        let mut cfg = EngineConfig::default().with_default_timeout(Duration::from_secs(7));
        cfg.kind_timeouts.clear();
        assert_eq!(cfg.timeout_for(JobKind::RenderPdf), Duration::from_secs(7));
    }

    #[test]
    fn engine_config_builders() {
        let cfg = EngineConfig::default()
            .with_workers(8)
            .with_queue_capacity(5)
            .with_max_jobs(50)
            .with_kind_timeout(JobKind::RenderPdf, Duration::from_millis(100))
            .with_cancel_grace(Duration::from_millis(10))
            .with_retention(None)
            .with_drain_timeout(Duration::from_secs(1));
        assert_eq!(cfg.worker_count, 8);
        assert_eq!(cfg.queue_capacity, 5);
        assert_eq!(cfg.max_jobs, 50);
        assert_eq!(cfg.timeout_for(JobKind::RenderPdf), Duration::from_millis(100));
        assert_eq!(cfg.cancel_grace, Duration::from_millis(10));
        assert!(cfg.retention.is_none());
        assert_eq!(cfg.drain_timeout, Duration::from_secs(1));
    }

    #[test]
    fn server_config_default() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(cfg.document_base_uri, "documents://resumes");
    }

    #[test]
    fn server_config_new() {
        let addr: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        let cfg = ServerConfig::new(addr).with_engine(EngineConfig::default().with_workers(2));
        assert_eq!(cfg.listen_addr, addr);
        assert_eq!(cfg.engine.worker_count, 2);
    }
}
