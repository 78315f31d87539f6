// Central Error Type for the Jobs Service

use crate::port::{DriverError, ExecutionError};
use thiserror::Error;

/// Operation identifiers attached to caller-facing errors
pub mod op {
    pub const INIT: &str = "jobs_plugin_init";
    pub const SERVE: &str = "jobs_plugin_serve";
    pub const PUSH: &str = "jobs_plugin_push";
    pub const PUSH_BATCH: &str = "jobs_plugin_push_batch";
    pub const DECLARE: &str = "jobs_plugin_declare";
    pub const DESTROY: &str = "jobs_plugin_destroy";
    pub const RESET: &str = "jobs_plugin_reset";
    pub const ACK: &str = "jobs_plugin_ack";
    pub const NACK: &str = "jobs_plugin_nack";
}

/// Flat classification of [`JobsError`], convenient for matching in callers and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Disabled,
    NotFound,
    DriverUnregistered,
    AlreadyDeclared,
    Construction,
    Push,
    Stop,
    Execution,
    AckNack,
}

/// Jobs service error type
#[derive(Error, Debug)]
pub enum JobsError {
    /// Configuration section absent; the service does not start
    #[error("{op}: jobs plugin disabled, no `{section}` configuration section")]
    Disabled { op: &'static str, section: String },

    #[error("{op}: no such pipeline, requested: {pipeline}")]
    NotFound { op: &'static str, pipeline: String },

    #[error("{op}: consumer not registered for the requested driver: {driver} (pipeline: {pipeline})")]
    DriverUnregistered {
        op: &'static str,
        pipeline: String,
        driver: String,
    },

    #[error("{op}: pipeline already declared: {pipeline}")]
    AlreadyDeclared { op: &'static str, pipeline: String },

    /// Driver constructor, Register or Run failed (`source` set), or the
    /// pipeline could not be matched to a driver at all
    #[error("{op}: driver {driver} failed for pipeline {pipeline}: {reason}")]
    Construction {
        op: &'static str,
        pipeline: String,
        driver: String,
        reason: String,
        #[source]
        source: Option<DriverError>,
    },

    #[error("{op}: push to pipeline {pipeline} failed: {source}")]
    Push {
        op: &'static str,
        pipeline: String,
        #[source]
        source: DriverError,
    },

    #[error("{op}: stop of driver {driver} for pipeline {pipeline} failed: {source}")]
    Stop {
        op: &'static str,
        pipeline: String,
        driver: String,
        #[source]
        source: DriverError,
    },

    /// Context resolution or executor invocation failed for a dequeued job
    #[error("{op}: execution failed: {source}")]
    Execution {
        op: &'static str,
        #[source]
        source: ExecutionError,
    },

    /// Ack or Nack itself failed; logged by the poller, never retried
    #[error("{op}: acknowledgement of job {job_id} (pipeline: {pipeline}) failed: {source}")]
    AckNack {
        op: &'static str,
        job_id: String,
        pipeline: String,
        #[source]
        source: DriverError,
    },
}

impl JobsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobsError::Disabled { .. } => ErrorKind::Disabled,
            JobsError::NotFound { .. } => ErrorKind::NotFound,
            JobsError::DriverUnregistered { .. } => ErrorKind::DriverUnregistered,
            JobsError::AlreadyDeclared { .. } => ErrorKind::AlreadyDeclared,
            JobsError::Construction { .. } => ErrorKind::Construction,
            JobsError::Push { .. } => ErrorKind::Push,
            JobsError::Stop { .. } => ErrorKind::Stop,
            JobsError::Execution { .. } => ErrorKind::Execution,
            JobsError::AckNack { .. } => ErrorKind::AckNack,
        }
    }

    /// The broker side rejected the pipeline, as opposed to a bad request
    pub fn is_driver_failure(&self) -> bool {
        matches!(self, JobsError::Construction { source: Some(_), .. })
    }

    pub(crate) fn construction(
        op: &'static str,
        pipeline: &crate::domain::Pipeline,
        reason: impl Into<String>,
    ) -> Self {
        JobsError::Construction {
            op,
            pipeline: pipeline.name().to_string(),
            driver: pipeline.driver().to_string(),
            reason: reason.into(),
            source: None,
        }
    }

    pub(crate) fn driver_failed(
        op: &'static str,
        pipeline: &crate::domain::Pipeline,
        reason: impl Into<String>,
        source: DriverError,
    ) -> Self {
        JobsError::Construction {
            op,
            pipeline: pipeline.name().to_string(),
            driver: pipeline.driver().to_string(),
            reason: reason.into(),
            source: Some(source),
        }
    }
}

/// Result type alias using JobsError
pub type Result<T> = std::result::Result<T, JobsError>;
