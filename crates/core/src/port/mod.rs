// Port Layer - Interfaces the dispatch engine consumes

pub mod driver;
pub mod executor;
pub mod id_provider;
pub mod queued_job;

// Re-exports
pub use driver::{Driver, DriverConstructor, DriverError};
pub use executor::{ExecutionError, Executor, ExecutorFactory, Payload};
pub use id_provider::IdProvider;
pub use queued_job::QueuedJob;
