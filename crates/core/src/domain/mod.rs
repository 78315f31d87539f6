// Domain Layer - Pipelines, jobs and lifecycle events

pub mod event;
pub mod job;
pub mod pipeline;

// Re-exports
pub use event::{EventKind, JobEvent};
pub use job::{Job, JobContext, JobId, JobOptions, Priority};
pub use pipeline::{Pipeline, DEFAULT_PIPELINE_PRIORITY};
