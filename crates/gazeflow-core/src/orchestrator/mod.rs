//! Runs pipeline actions on the worker pool and feeds their outcomes back
//! into the state store.
//!
//! `Orchestrator` owns a `JobPool<JobTicket>`. Submitting marks the action
//! `pending`; the pool callback writes `running` when a worker picks the
//! job up and the terminal state when it finishes. Only a `completed`
//! outcome cascades the invalidation. Callback failures are logged, since
//! there is no caller left to return them to.

pub mod driver;
pub mod request;

pub use driver::{Orchestrator, RecoveredAction};
pub use request::{JobTicket, WorkRequest};
