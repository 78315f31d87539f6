// Job & Pipeline Lifecycle Events

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Event kinds carried on the event bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    JobStart,
    JobOk,
    JobError,
    PushOk,
    PushError,
    PipeRun,
    PipeActive,
    PipePaused,
    PipeStopped,
    PipeError,
    DriverReady,
    Initialized,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::JobStart => "JOB_START",
            EventKind::JobOk => "JOB_OK",
            EventKind::JobError => "JOB_ERROR",
            EventKind::PushOk => "PUSH_OK",
            EventKind::PushError => "PUSH_ERROR",
            EventKind::PipeRun => "PIPE_RUN",
            EventKind::PipeActive => "PIPE_ACTIVE",
            EventKind::PipePaused => "PIPE_PAUSED",
            EventKind::PipeStopped => "PIPE_STOPPED",
            EventKind::PipeError => "PIPE_ERROR",
            EventKind::DriverReady => "DRIVER_READY",
            EventKind::Initialized => "INITIALIZED",
        };
        write!(f, "{}", name)
    }
}

/// Telemetry record emitted by drivers, pollers and the registry
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub kind: EventKind,
    pub id: Option<String>,
    pub pipeline: String,
    pub driver: String,
    pub error: Option<String>,
    pub start: DateTime<Utc>,
    pub elapsed: Duration,
}

impl JobEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            id: None,
            pipeline: String::new(),
            driver: String::new(),
            error: None,
            start: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn pipeline(mut self, pipeline: impl Into<String>) -> Self {
        self.pipeline = pipeline.into();
        self
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn job_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    /// Stamp timing from a monotonic start point
    pub fn timed(mut self, started: Instant) -> Self {
        let elapsed = started.elapsed();
        self.elapsed = elapsed;
        self.start = Utc::now() - chrono::Duration::from_std(elapsed).unwrap_or_default();
        self
    }
}
