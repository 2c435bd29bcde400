//! `gazeflow-pool`: a bounded pool of isolated worker processes.
//!
//! Each job is a [`WorkOrder`] (program, arguments, stdin) run as its own
//! OS process, so a crashing or memory-hungry worker can never take the
//! orchestrator down with it. The pool knows nothing about pipelines: it
//! hands out job ids, tracks an opaque caller payload per job, supports
//! cancellation, and reports outcomes through callbacks.
//!
//! # Architecture
//!
//! ```text
//! JobPool::submit ──► bookkeeping (one mutex) ──► driver task
//!                                                   │ waits for a worker slot
//!                                                   ▼ (fair semaphore)
//!                                              child process
//!                                                   │ exit status / kill
//!                                                   ▼
//!                       entry removed ──► pool callback + per-job observers
//! ```
//!
//! The tokio runtime that drives the driver tasks is created lazily on the
//! first submission and torn down by [`JobPool::cleanup_if_idle`] (or
//! automatically once idle, see [`PoolSettings::auto_cleanup`]).
//!
//! # Quick start
//!
//! ```rust,ignore
//! use gazeflow_pool::{JobPool, PoolSettings, WorkOrder};
//! use std::sync::Arc;
//!
//! let pool = JobPool::with_callback(
//!     PoolSettings::default(),
//!     Arc::new(|id, label: &String, state| println!("{id} {label}: {state}")),
//! );
//! let id = pool.submit(WorkOrder::new("sh").args(["-c", "sleep 1"]), "nap".to_string())?;
//! pool.cancel_job(id);
//! ```

pub mod error;
pub mod job;
pub mod pool;

pub(crate) mod process;

#[cfg(test)]
mod tests;

pub use error::PoolError;
pub use job::{JobId, JobState, WorkOrder};
pub use pool::{DoneCallback, JobCallback, JobPool, PoolSettings};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, PoolError>;
