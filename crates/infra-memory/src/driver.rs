// Ephemeral Driver - in-process broker feeding the priority queue directly
//
// Jobs pushed while the pipeline is not consuming (registered only, or
// paused) are held in a local buffer and flushed on Run/Resume. Delayed jobs
// wait on a timer task; Stop cancels those timers and discards the buffer.
//
// Queue feeders (flush, direct pushes) run one at a time under `feed`, and
// every insert re-checks the status after a queue slot is reserved, so a
// pause or stop landing while a feeder waits on a full queue is honoured.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use relay_core::application::{EventBus, JobQueue};
use relay_core::domain::{EventKind, Job, JobEvent, Pipeline};
use relay_core::port::{Driver, DriverConstructor, DriverError};

use crate::item::EphemeralItem;

/// Driver type name pipelines refer to
pub const DRIVER_NAME: &str = "ephemeral";

/// Pipeline option: how many times a nacked job is re-inserted
pub const RETRIES_OPTION: &str = "retries";

#[derive(Default)]
pub(crate) struct Counters {
    pushed: AtomicU64,
    pub(crate) acked: AtomicU64,
    pub(crate) nacked: AtomicU64,
    pub(crate) requeued: AtomicU64,
}

/// Point-in-time view of the driver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub pushed: u64,
    pub acked: u64,
    pub nacked: u64,
    pub requeued: u64,
}

impl Counters {
    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
        }
    }
}

/// Builds ephemeral drivers; all drivers it builds share one set of counters
#[derive(Default)]
pub struct EphemeralConstructor {
    counters: Arc<Counters>,
}

impl EphemeralConstructor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }
}

#[async_trait]
impl DriverConstructor for EphemeralConstructor {
    async fn construct(
        &self,
        config_key: &str,
        events: Arc<EventBus>,
        queue: Arc<JobQueue>,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        debug!(config_key = %config_key, "constructing ephemeral driver");
        Ok(Arc::new(EphemeralDriver::new(
            events,
            queue,
            Arc::clone(&self.counters),
        )))
    }

    async fn from_pipeline(
        &self,
        pipeline: &Pipeline,
        events: Arc<EventBus>,
        queue: Arc<JobQueue>,
    ) -> Result<Arc<dyn Driver>, DriverError> {
        debug!(pipeline = %pipeline.name(), "constructing ephemeral driver from pipeline");
        Ok(Arc::new(EphemeralDriver::new(
            events,
            queue,
            Arc::clone(&self.counters),
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// Registered, not consuming
    Inactive,
    Active,
    Paused,
    Stopped,
}

struct State {
    pipeline: Option<Arc<Pipeline>>,
    status: Status,
    buffer: VecDeque<Job>,
}

pub(crate) struct Shared {
    events: Arc<EventBus>,
    queue: Arc<JobQueue>,
    pub(crate) counters: Arc<Counters>,
    state: Mutex<State>,
    feed: tokio::sync::Mutex<()>,
    stopped: CancellationToken,
    timers: TaskTracker,
}

impl Shared {
    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    pub(crate) fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub(crate) fn emit(&self, event: JobEvent) {
        self.events.push(event.driver(DRIVER_NAME));
    }

    /// Hand the job to the queue if consuming, otherwise keep it local
    async fn accept(self: &Arc<Self>, job: Job) -> Result<(), DriverError> {
        {
            let mut state = self.state.lock();
            match state.status {
                Status::Active => {}
                Status::Inactive | Status::Paused => {
                    state.buffer.push_back(job);
                    return Ok(());
                }
                Status::Stopped => return Err(DriverError::Closed),
            }
        }

        let _feed = self.feed.lock().await;
        let slot = self.queue.reserve().await?;

        let mut state = self.state.lock();
        match state.status {
            // a flush still owes the queue older jobs; queue behind them
            Status::Active if state.buffer.is_empty() => {
                let retries = retries_of(state.pipeline.as_deref());
                slot.insert(Box::new(EphemeralItem::new(job, retries, self)));
                Ok(())
            }
            Status::Active | Status::Inactive | Status::Paused => {
                state.buffer.push_back(job);
                Ok(())
            }
            Status::Stopped => Err(DriverError::Closed),
        }
    }

    /// Move the local buffer into the queue, oldest first, for as long as
    /// the pipeline stays active. Jobs left over by a pause stay buffered.
    async fn flush(self: &Arc<Self>) -> Result<(), DriverError> {
        let _feed = self.feed.lock().await;

        let pending = self.state.lock().buffer.len();
        if pending > 0 {
            debug!(jobs = pending, "flushing buffered jobs");
        }

        loop {
            if self.state.lock().buffer.is_empty() {
                return Ok(());
            }
            let slot = self.queue.reserve().await?;

            let mut state = self.state.lock();
            match state.status {
                Status::Active => {}
                Status::Stopped => return Err(DriverError::Closed),
                Status::Inactive | Status::Paused => return Ok(()),
            }
            let Some(job) = state.buffer.pop_front() else {
                return Ok(());
            };
            let retries = retries_of(state.pipeline.as_deref());
            slot.insert(Box::new(EphemeralItem::new(job, retries, self)));
        }
    }

    fn pipeline_name(&self) -> String {
        self.state
            .lock()
            .pipeline
            .as_ref()
            .map(|p| p.name().to_string())
            .unwrap_or_default()
    }
}

fn retries_of(pipeline: Option<&Pipeline>) -> u32 {
    pipeline
        .map(|p| p.int(RETRIES_OPTION, 0).max(0) as u32)
        .unwrap_or(0)
}

/// In-memory broker bound to a single pipeline
pub struct EphemeralDriver {
    shared: Arc<Shared>,
}

impl EphemeralDriver {
    pub(crate) fn new(
        events: Arc<EventBus>,
        queue: Arc<JobQueue>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                events,
                queue,
                counters,
                state: Mutex::new(State {
                    pipeline: None,
                    status: Status::Inactive,
                    buffer: VecDeque::new(),
                }),
                feed: tokio::sync::Mutex::new(()),
                stopped: CancellationToken::new(),
                timers: TaskTracker::new(),
            }),
        }
    }

    /// Jobs held locally until the pipeline consumes
    pub fn buffered(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    fn check_pipeline(&self, name: &str) -> Result<(), DriverError> {
        let state = self.shared.state.lock();
        if state.status == Status::Stopped {
            return Err(DriverError::Closed);
        }
        match &state.pipeline {
            Some(p) if p.name() == name => Ok(()),
            _ => Err(DriverError::PipelineNotRegistered(name.to_string())),
        }
    }

    /// Switch to consuming and drain the buffer. `from` lists the states
    /// the switch is allowed from.
    async fn activate(&self, from: &[Status]) -> Result<bool, DriverError> {
        {
            let mut state = self.shared.state.lock();
            if !from.contains(&state.status) {
                return Ok(false);
            }
            state.status = Status::Active;
        }
        self.shared.flush().await?;
        Ok(true)
    }

    fn schedule(&self, job: Job, delay: Duration) {
        let shared = Arc::clone(&self.shared);
        self.shared.timers.spawn(async move {
            tokio::select! {
                _ = shared.stopped.cancelled() => {
                    debug!(id = %job.id, "delayed job discarded on stop");
                }
                _ = tokio::time::sleep(delay) => {
                    let id = job.id.clone();
                    let pipeline = job.pipeline().to_string();
                    if let Err(e) = shared.accept(job).await {
                        warn!(id = %id, error = %e, "delayed job could not be queued");
                        shared.emit(
                            JobEvent::new(EventKind::PushError)
                                .pipeline(pipeline)
                                .job_id(id)
                                .error(e),
                        );
                    }
                }
            }
        });
    }
}

#[async_trait]
impl Driver for EphemeralDriver {
    async fn register(&self, pipeline: &Pipeline) -> Result<(), DriverError> {
        let mut state = self.shared.state.lock();
        if state.status == Status::Stopped {
            return Err(DriverError::Closed);
        }
        if let Some(bound) = &state.pipeline {
            if bound.name() != pipeline.name() {
                return Err(DriverError::Config(format!(
                    "driver already bound to pipeline {}",
                    bound.name()
                )));
            }
        }

        state.pipeline = Some(Arc::new(pipeline.clone()));
        debug!(pipeline = %pipeline.name(), "pipeline registered");
        Ok(())
    }

    async fn run(&self, pipeline: &Pipeline) -> Result<(), DriverError> {
        let started = Instant::now();
        self.check_pipeline(pipeline.name())?;
        self.activate(&[Status::Inactive, Status::Paused]).await?;

        self.shared.emit(
            JobEvent::new(EventKind::PipeActive)
                .pipeline(pipeline.name())
                .timed(started),
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), DriverError> {
        let started = Instant::now();
        let discarded = {
            let mut state = self.shared.state.lock();
            if state.status == Status::Stopped {
                return Ok(());
            }
            state.status = Status::Stopped;
            std::mem::take(&mut state.buffer).len()
        };

        self.shared.stopped.cancel();
        self.shared.timers.close();

        if discarded > 0 {
            info!(discarded, "buffered jobs discarded on stop");
        }
        self.shared.emit(
            JobEvent::new(EventKind::PipeStopped)
                .pipeline(self.shared.pipeline_name())
                .timed(started),
        );
        Ok(())
    }

    async fn pause(&self, pipeline: &str) {
        let started = Instant::now();
        if let Err(e) = self.check_pipeline(pipeline) {
            warn!(pipeline = %pipeline, error = %e, "pause ignored");
            return;
        }

        {
            let mut state = self.shared.state.lock();
            if state.status != Status::Active {
                warn!(pipeline = %pipeline, "pipeline is not consuming, pause ignored");
                return;
            }
            state.status = Status::Paused;
        }

        self.shared.emit(
            JobEvent::new(EventKind::PipePaused)
                .pipeline(pipeline)
                .timed(started),
        );
    }

    async fn resume(&self, pipeline: &str) {
        let started = Instant::now();
        if let Err(e) = self.check_pipeline(pipeline) {
            warn!(pipeline = %pipeline, error = %e, "resume ignored");
            return;
        }

        match self.activate(&[Status::Paused, Status::Inactive]).await {
            Ok(true) => self.shared.emit(
                JobEvent::new(EventKind::PipeActive)
                    .pipeline(pipeline)
                    .timed(started),
            ),
            Ok(false) => warn!(pipeline = %pipeline, "pipeline already consuming, resume ignored"),
            Err(e) => self.shared.emit(
                JobEvent::new(EventKind::PipeError)
                    .pipeline(pipeline)
                    .error(e)
                    .timed(started),
            ),
        }
    }

    async fn push(&self, job: Job) -> Result<(), DriverError> {
        let started = Instant::now();
        self.check_pipeline(job.pipeline())?;

        let (id, pipeline) = (job.id.clone(), job.pipeline().to_string());
        let delay = job.options.delay;

        if delay > 0 {
            self.schedule(job, Duration::from_secs(delay));
        } else {
            self.shared.accept(job).await?;
        }

        self.shared.counters.pushed.fetch_add(1, Ordering::Relaxed);
        self.shared.emit(
            JobEvent::new(EventKind::PushOk)
                .pipeline(pipeline)
                .job_id(id)
                .timed(started),
        );
        Ok(())
    }
}
