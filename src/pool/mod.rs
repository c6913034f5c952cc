//! Bounded worker pool — ordered fan-out of independent fetches.
//!
//! Core components:
//! - `job` — `Job` description (inputs, worker count, task, cancellation) and the executor
//! - `batch` — `BatchResult`, index-aligned outputs/errors plus classification

pub mod batch;
pub mod job;

pub use batch::BatchResult;
pub use job::{DEFAULT_WORKERS, Job};
