use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::HandlerError;
use crate::scheduler::{JobKind, JobStore};

/// Handle given to a handler for the job it is executing.
///
/// Carries the job's cancellation signal and lets the handler publish
/// progress. Progress writes go to the job record on behalf of the owning
/// worker and are dropped once the job is terminal.
#[derive(Debug, Clone)]
pub struct JobContext {
    job_id: Uuid,
    kind: JobKind,
    owner_id: String,
    cancellation: CancellationToken,
    store: Option<Arc<RwLock<JobStore>>>,
}

impl JobContext {
    pub fn new(
        job_id: Uuid,
        kind: JobKind,
        owner_id: impl Into<String>,
        cancellation: CancellationToken,
        store: Arc<RwLock<JobStore>>,
    ) -> Self {
        Self {
            job_id,
            kind,
            owner_id: owner_id.into(),
            cancellation,
            store: Some(store),
        }
    }

    /// Context not attached to any store; progress reports are discarded.
    pub fn detached(job_id: Uuid, kind: JobKind, owner_id: impl Into<String>) -> Self {
        Self {
            job_id,
            kind,
            owner_id: owner_id.into(),
            cancellation: CancellationToken::new(),
            store: None,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves when the job is cancelled or times out.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Bail out early with [`HandlerError::Cancelled`] if cancellation was requested.
    pub fn ensure_active(&self) -> Result<(), HandlerError> {
        if self.is_cancelled() {
            Err(HandlerError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Publish progress (0-100). Lower values than the last report are ignored.
    pub async fn report_progress(&self, percent: u8) {
        let Some(store) = &self.store else {
            return;
        };
        if store.write().await.report_progress(&self.job_id, percent) {
            tracing::debug!(job_id = %self.job_id, percent, "Progress reported");
        }
    }
}
