//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results.

use relay_core::domain::{Job, Pipeline, Priority};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Delivery options of a pushed job
#[derive(Debug, Default, Deserialize)]
pub struct JobOptionsRequest {
    /// 0 (or absent) inherits the pipeline priority
    #[serde(default)]
    pub priority: Priority,
    pub pipeline: String,
    /// Seconds before the job becomes ready
    #[serde(default)]
    pub delay: u64,
}

/// jobs.push.v1 - Push one job
#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub job: String,
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    pub options: JobOptionsRequest,
}

impl PushRequest {
    pub fn into_job(self, id: String) -> Job {
        let mut job = Job::new(self.job, id, self.options.pipeline, self.payload.into_bytes())
            .with_priority(self.options.priority)
            .with_delay(self.options.delay);
        job.headers = self.headers;
        job
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PushResponse {
    pub id: String,
    pub pipeline: String,
}

/// jobs.push_batch.v1 - Push jobs in order, stopping at the first failure
#[derive(Debug, Deserialize)]
pub struct PushBatchRequest {
    pub jobs: Vec<PushRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushBatchResponse {
    pub ids: Vec<String>,
}

/// jobs.declare.v1 - Declare a pipeline at runtime
#[derive(Debug, Deserialize)]
pub struct DeclareRequest {
    pub pipeline: Pipeline,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeclareResponse {
    pub pipeline: String,
}

/// jobs.destroy.v1 - Destroy a pipeline
#[derive(Debug, Deserialize)]
pub struct DestroyRequest {
    pub pipeline: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DestroyResponse {
    pub pipeline: String,
    pub destroyed: bool,
}

/// jobs.pause.v1 / jobs.resume.v1
#[derive(Debug, Deserialize)]
pub struct PipelinesRequest {
    pub pipelines: Vec<String>,
}

/// jobs.pause.v1 / jobs.resume.v1 / jobs.list.v1
#[derive(Debug, Clone, Serialize)]
pub struct PipelinesResponse {
    pub pipelines: Vec<String>,
}

/// jobs.reset.v1 - Restart the worker pool
#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub reset: bool,
}
