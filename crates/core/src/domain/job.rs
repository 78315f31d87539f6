// Job Domain Model

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Job ID
pub type JobId = String;

/// Priority (lower number = served first, 0 = inherit from pipeline)
pub type Priority = i64;

/// Delivery options a job is pushed with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default)]
    pub priority: Priority,
    pub pipeline: String,
    /// Seconds to hold the job before it becomes ready
    #[serde(default)]
    pub delay: u64,
}

/// Unit of work addressed to a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job name, routed to a handler by the worker
    pub job: String,
    pub id: JobId,
    /// Opaque payload handed to the executor
    #[serde(default)]
    pub body: Vec<u8>,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    pub options: JobOptions,
}

/// Metadata serialized next to the body for every execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub id: JobId,
    pub job: String,
    pub driver: String,
    pub pipeline: String,
    pub headers: HashMap<String, Vec<String>>,
}

impl Job {
    pub fn new(
        job: impl Into<String>,
        id: impl Into<String>,
        pipeline: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            job: job.into(),
            id: id.into(),
            body: body.into(),
            headers: HashMap::new(),
            options: JobOptions {
                pipeline: pipeline.into(),
                ..Default::default()
            },
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.options.priority = priority;
        self
    }

    pub fn with_delay(mut self, seconds: u64) -> Self {
        self.options.delay = seconds;
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn pipeline(&self) -> &str {
        &self.options.pipeline
    }

    pub fn priority(&self) -> Priority {
        self.options.priority
    }

    /// Replace an unset (zero) priority with the pipeline's.
    ///
    /// Returns the effective priority.
    pub fn inherit_priority(&mut self, pipeline_priority: Priority) -> Priority {
        if self.options.priority == 0 {
            self.options.priority = pipeline_priority;
        }
        self.options.priority
    }

    /// Serialized execution context for the given driver
    pub fn context(&self, driver: &str) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&JobContext {
            id: self.id.clone(),
            job: self.job.clone(),
            driver: driver.to_string(),
            pipeline: self.options.pipeline.clone(),
            headers: self.headers.clone(),
        })
    }
}
