//! Durable background task queue with named priority queues.
//!
//! ## Design
//!
//! - At-least-once delivery: claims carry a lease; orphaned claims are
//!   returned to the queue, so handlers must be idempotent
//! - Named queues with service weights (`critical` ahead of `default`)
//! - Retry with backoff up to a per-task budget; exhausted tasks are
//!   dropped and logged, there is no dead-letter queue
//! - Delayed admission via `scheduled_at`
//!
//! ## Components
//!
//! - `Task`: the queued unit of work, kind + JSON payload
//! - `TaskStore`: broker persistence (Postgres, in-memory for tests)
//! - `TaskDistributor`: producer-side enqueue API
//! - `TaskProcessor`: weighted worker loops dispatching to handlers

pub mod distributor;
pub mod postgres;
pub mod processor;
pub mod store;
pub mod types;

pub use distributor::TaskDistributor;
pub use postgres::PgTaskStore;
pub use processor::{ProcessorConfig, ProcessorHandle, QueueRotation, TaskHandler, TaskProcessor};
pub use store::{InMemoryTaskStore, TaskStore, TaskStoreError};
pub use types::{BackoffStrategy, Queue, RetryPolicy, Task, TaskId, TaskOutcome, TaskStatus};
