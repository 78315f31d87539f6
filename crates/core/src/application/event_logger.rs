// Event Logger - renders lifecycle events as structured log records

use tracing::{error, info, warn};

use super::event_bus::EventListener;
use crate::domain::{EventKind, JobEvent};

/// The service's own listener on the event bus
pub struct EventLogger;

impl EventListener for EventLogger {
    fn on_event(&self, ev: &JobEvent) {
        let start = ev.start.to_rfc3339();
        let elapsed = ev.elapsed;
        let id = ev.id.as_deref().unwrap_or_default();
        let err = ev.error.as_deref().unwrap_or_default();

        match ev.kind {
            EventKind::JobStart => {
                info!(job_id = %id, pipeline = %ev.pipeline, start = %start, elapsed = ?elapsed, "job started")
            }
            EventKind::JobOk => {
                info!(job_id = %id, pipeline = %ev.pipeline, start = %start, elapsed = ?elapsed, "job OK")
            }
            EventKind::PushOk => {
                info!(job_id = %id, pipeline = %ev.pipeline, start = %start, elapsed = ?elapsed, "job pushed to the queue")
            }
            EventKind::PushError => error!(
                error = %err,
                pipeline = %ev.pipeline,
                job_id = %id,
                driver = %ev.driver,
                start = %start,
                elapsed = ?elapsed,
                "job push error"
            ),
            EventKind::JobError => error!(
                error = %err,
                pipeline = %ev.pipeline,
                job_id = %id,
                driver = %ev.driver,
                start = %start,
                elapsed = ?elapsed,
                "job error"
            ),
            EventKind::PipeRun => {
                info!(pipeline = %ev.pipeline, driver = %ev.driver, start = %start, elapsed = ?elapsed, "pipeline started")
            }
            EventKind::PipeActive => {
                info!(pipeline = %ev.pipeline, start = %start, elapsed = ?elapsed, "pipeline active")
            }
            EventKind::PipePaused => {
                warn!(pipeline = %ev.pipeline, start = %start, elapsed = ?elapsed, "pipeline paused")
            }
            EventKind::PipeStopped => {
                warn!(pipeline = %ev.pipeline, start = %start, elapsed = ?elapsed, "pipeline stopped")
            }
            EventKind::PipeError => error!(
                pipeline = %ev.pipeline,
                driver = %ev.driver,
                job_id = %id,
                error = %err,
                start = %start,
                elapsed = ?elapsed,
                "pipeline error"
            ),
            EventKind::DriverReady => {
                info!(pipeline = %ev.pipeline, driver = %ev.driver, start = %start, elapsed = ?elapsed, "driver ready")
            }
            EventKind::Initialized => {
                info!(driver = %ev.driver, start = %start, "driver initialized")
            }
        }
    }
}
