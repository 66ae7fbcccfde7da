//! Job execution: handlers, the executor that isolates them, and the pool
//! of workers that drives both.
//!
//! # Components
//!
//! - [`TaskHandler`]: performs the work for one job kind
//! - [`HandlerRegistry`]: kind-to-handler mapping fixed at start-up
//! - [`JobExecutor`]: runs a handler with a time budget, cancellation and
//!   panic isolation
//! - [`WorkerPool`]: fixed set of tokio tasks pulling from the engine queue
//!
//! # Execution Flow
//!
//! 1. A worker claims the next queued job, which moves it to `running`
//! 2. [`JobExecutor::execute`] spawns the handler in its own task
//! 3. The handler's return, panic, timeout or cancellation becomes an
//!    [`ExecutionResult`](executor::ExecutionResult)
//! 4. The worker records the terminal state on the job

pub mod context;
pub mod executor;
pub mod pool;
pub mod registry;

pub use context::JobContext;
pub use executor::{ExecutionResult, JobExecutor};
pub use pool::WorkerPool;
pub use registry::{handler_fn, HandlerRegistry, HandlerRegistryBuilder, TaskHandler};
