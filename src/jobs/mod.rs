//! # Task Queue
//!
//! Durable typed background tasks over Postgres: enqueue on the request
//! path, consume in the worker process.
//!
//! ## Key Components
//!
//! - `task`: the four task kinds with their payloads and per-kind policy
//! - `TaskQueue`: durable enqueue/claim/retry/archive plus introspection
//! - `Client`: the enqueue-side dispatcher handed to request handlers
//! - `Worker` + `Handlers`: the consume side with weighted scheduling
//!
//! Delivery is at-least-once; every handler is idempotent (page upsert,
//! deterministic chunk ids, state transitions rather than increments).

mod client;
mod handlers;
mod queue;
pub mod task;
mod worker;

pub use client::Client;
pub use handlers::{Handlers, TaskFailure};
pub use queue::{backoff_seconds, QueueStats, TaskQueue};
pub use task::{Task, TaskKind, TaskState};
pub use worker::{weighted_order, Worker, WorkerConfig};
