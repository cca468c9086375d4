//! # Messaging Module
//!
//! Job queue contract consumed by queue-backed step handlers, plus an
//! in-memory provider for tests and single-process hosts.

pub mod errors;
pub mod in_memory;
pub mod queue;

pub use errors::QueueError;
pub use in_memory::{InMemoryJobQueue, JobProcessor};
pub use queue::{
    BackoffType, JobBackoff, JobId, JobOptions, JobQueue, JobSnapshot, JobStatus, NewJob,
    QueueStats,
};
