use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{HandlerError, MissingHandler};
use crate::scheduler::{JobKind, JobOutput, JobPayload};
use crate::worker::context::JobContext;

/// Performs the work for one job kind.
///
/// Implementations wrap external collaborators (document parser, PDF
/// renderer, scoring service) and are treated as opaque: they may be slow,
/// may fail, and may panic. The worker isolates all three.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Reject a payload at submission time, before a job is created.
    fn validate(&self, _payload: &JobPayload) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, payload: JobPayload, ctx: JobContext) -> Result<JobOutput, HandlerError>;
}

/// Handler backed by an async closure.
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a [`TaskHandler`].
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(JobPayload, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JobOutput, HandlerError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(JobPayload, JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JobOutput, HandlerError>> + Send + 'static,
{
    async fn run(&self, payload: JobPayload, ctx: JobContext) -> Result<JobOutput, HandlerError> {
        (self.f)(payload, ctx).await
    }
}

/// Immutable kind-to-handler mapping, built once at start-up.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobKind, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    pub fn lookup(&self, kind: JobKind) -> Result<Arc<dyn TaskHandler>, MissingHandler> {
        self.handlers.get(&kind).cloned().ok_or(MissingHandler(kind))
    }

    pub fn contains(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Registered kinds in declaration order.
    pub fn kinds(&self) -> Vec<JobKind> {
        JobKind::ALL
            .into_iter()
            .filter(|k| self.handlers.contains_key(k))
            .collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<JobKind, Arc<dyn TaskHandler>>,
}

impl HandlerRegistryBuilder {
    /// Register a handler. A later registration for the same kind wins.
    pub fn register<H: TaskHandler>(mut self, kind: JobKind, handler: H) -> Self {
        if self.handlers.insert(kind, Arc::new(handler)).is_some() {
            tracing::warn!(kind = %kind, "Handler replaced during registration");
        }
        self
    }

    pub fn register_arc(mut self, kind: JobKind, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}
