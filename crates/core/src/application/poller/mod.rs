// Poller Pool - N loops draining the priority queue into the executor
//
// Each loop is either polling (blocked in extract_min, where it also watches
// the shutdown token) or dispatching one job. A job's Ack/Nack is issued by
// the poller that dispatched it before that poller polls again.

mod shutdown;

pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use super::event_bus::EventBus;
use super::executor_handle::ExecutorHandle;
use super::priority_queue::JobQueue;
use crate::domain::{EventKind, JobEvent};
use crate::error::{op, JobsError};
use crate::port::{ExecutionError, Payload, QueuedJob};

/// How a single dispatch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Acked,
    Nacked,
}

/// One polling loop
pub struct Poller {
    id: usize,
    queue: Arc<JobQueue>,
    executor: Arc<ExecutorHandle>,
    events: Arc<EventBus>,
}

impl Poller {
    pub fn new(
        id: usize,
        queue: Arc<JobQueue>,
        executor: Arc<ExecutorHandle>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            id,
            queue,
            executor,
            events,
        }
    }

    /// Poll until shutdown is observed or the queue closes
    pub async fn run(self, shutdown: ShutdownToken) {
        debug!(poller = self.id, "job poller started");
        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                job = self.queue.extract_min() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            self.dispatch(job).await;
        }
        debug!(poller = self.id, "------> job poller stopped <------");
    }

    /// Run one job through the executor and acknowledge the outcome.
    /// Never fails: every error is resolved by Nack + log.
    pub async fn dispatch(&self, job: Box<dyn QueuedJob>) -> Dispatch {
        let started = Instant::now();

        let context = match job.context() {
            Ok(ctx) => ctx,
            Err(e) => {
                self.settle(job.as_ref(), Dispatch::Nacked).await;
                error!(job_id = %job.id(), error = %e, "job marshal context");
                self.job_error(job.as_ref(), ExecutionError::Context(e.to_string()), started);
                return Dispatch::Nacked;
            }
        };

        let payload = Payload {
            context,
            body: job.body().to_vec(),
        };

        self.events.push(
            JobEvent::new(EventKind::JobStart)
                .job_id(job.id())
                .pipeline(job.pipeline()),
        );

        // protect from the pool reset
        let executor = self.executor.read().await;
        let outcome = AssertUnwindSafe(executor.exec(payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ExecutionError::Panicked(panic_message(panic))));
        if let Err(e) = outcome {
            self.settle(job.as_ref(), Dispatch::Nacked).await;
            drop(executor);
            error!(job_id = %job.id(), pipeline = %job.pipeline(), error = %e, "job execute");
            self.job_error(job.as_ref(), e, started);
            return Dispatch::Nacked;
        }
        drop(executor);

        self.settle(job.as_ref(), Dispatch::Acked).await;

        self.events.push(
            JobEvent::new(EventKind::JobOk)
                .job_id(job.id())
                .pipeline(job.pipeline())
                .timed(started),
        );
        Dispatch::Acked
    }

    /// Ack/Nack failures end here: logged, never retried or escalated
    async fn settle(&self, job: &dyn QueuedJob, outcome: Dispatch) {
        if let Err(e) = acknowledge(job, outcome).await {
            error!(poller = self.id, error = %e, "job acknowledgement");
        }
    }

    fn job_error(&self, job: &dyn QueuedJob, err: ExecutionError, started: Instant) {
        self.events.push(
            JobEvent::new(EventKind::JobError)
                .job_id(job.id())
                .pipeline(job.pipeline())
                .error(err)
                .timed(started),
        );
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Fixed set of pollers started after the executor is ready
pub struct PollerPool {
    queue: Arc<JobQueue>,
    executor: Arc<ExecutorHandle>,
    events: Arc<EventBus>,
    tracker: TaskTracker,
    senders: Mutex<Vec<ShutdownSender>>,
}

impl PollerPool {
    pub fn new(queue: Arc<JobQueue>, executor: Arc<ExecutorHandle>, events: Arc<EventBus>) -> Self {
        Self {
            queue,
            executor,
            events,
            tracker: TaskTracker::new(),
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Spawn `count` pollers sharing one shutdown token
    pub fn start(&self, count: usize) {
        let (tx, rx) = shutdown_channel();
        for id in 0..count {
            let poller = Poller::new(
                id,
                Arc::clone(&self.queue),
                Arc::clone(&self.executor),
                Arc::clone(&self.events),
            );
            self.tracker.spawn(poller.run(rx.clone()));
        }
        self.senders.lock().push(tx);
        debug!(pollers = count, "job pollers started");
    }

    /// Broadcast shutdown and wait at most `grace` for the pollers.
    ///
    /// Returns `false` if some pollers were still dispatching when the grace
    /// period ran out; those are abandoned.
    pub async fn stop(&self, grace: Duration) -> bool {
        for tx in self.senders.lock().drain(..) {
            tx.shutdown();
        }
        self.tracker.close();

        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    abandoned = self.tracker.len(),
                    grace = ?grace,
                    "pollers did not stop within the grace period"
                );
                false
            }
        }
    }

    /// Pollers that have not exited yet
    pub fn running(&self) -> usize {
        self.tracker.len()
    }
}

/// Report the dispatch outcome to the job's owning driver
async fn acknowledge(job: &dyn QueuedJob, outcome: Dispatch) -> Result<(), JobsError> {
    let (op, result) = match outcome {
        Dispatch::Acked => (op::ACK, job.ack().await),
        Dispatch::Nacked => (op::NACK, job.nack().await),
    };
    result.map_err(|source| JobsError::AckNack {
        op,
        job_id: job.id().to_string(),
        pipeline: job.pipeline().to_string(),
        source,
    })
}
