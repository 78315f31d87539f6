// Driver Port
// Broker back-ends (amqp, sqs, ephemeral, ...) implement these traits;
// the registry treats every variant uniformly through them.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::application::event_bus::EventBus;
use crate::application::priority_queue::{JobQueue, QueueError};
use crate::domain::{Job, Pipeline};

/// Errors reported by drivers
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("pipeline not registered with the driver: {0}")]
    PipelineNotRegistered(String),

    #[error("driver is stopped")]
    Closed,

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid driver configuration: {0}")]
    Config(String),
}

/// Live consumer bound to one pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Driver: Send + Sync {
    /// Driver-side preparation (e.g. declaring broker topology)
    async fn register(&self, pipeline: &Pipeline) -> Result<(), DriverError>;

    /// Begin consuming from the broker and feeding the priority queue
    async fn run(&self, pipeline: &Pipeline) -> Result<(), DriverError>;

    async fn stop(&self) -> Result<(), DriverError>;

    async fn pause(&self, pipeline: &str);

    async fn resume(&self, pipeline: &str);

    /// Get the job into the priority queue, directly or via the broker
    async fn push(&self, job: Job) -> Result<(), DriverError>;
}

/// Driver constructor, registered once per driver type at startup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DriverConstructor: Send + Sync {
    /// Build a driver for a configured pipeline; `config_key` is
    /// `jobs.pipelines.<name>`
    async fn construct(
        &self,
        config_key: &str,
        events: Arc<EventBus>,
        queue: Arc<JobQueue>,
    ) -> Result<Arc<dyn Driver>, DriverError>;

    /// Build a driver for a pipeline declared at runtime
    async fn from_pipeline(
        &self,
        pipeline: &Pipeline,
        events: Arc<EventBus>,
        queue: Arc<JobQueue>,
    ) -> Result<Arc<dyn Driver>, DriverError>;
}
