// Ephemeral queue item - a job plus its delivery attempt

use async_trait::async_trait;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use relay_core::domain::{EventKind, Job, JobEvent, Priority};
use relay_core::port::{DriverError, QueuedJob};

use crate::driver::{Counters, Shared, DRIVER_NAME};

pub struct EphemeralItem {
    job: Job,
    /// Zero-based delivery attempt
    attempt: u32,
    retries: u32,
    counters: Arc<Counters>,
    /// The item must not keep a stopped driver (and its queue) alive
    driver: Weak<Shared>,
}

impl EphemeralItem {
    pub(crate) fn new(job: Job, retries: u32, driver: &Arc<Shared>) -> Self {
        Self {
            job,
            attempt: 0,
            retries,
            counters: Arc::clone(&driver.counters),
            driver: Arc::downgrade(driver),
        }
    }

    fn redelivery(&self) -> Self {
        Self {
            job: self.job.clone(),
            attempt: self.attempt + 1,
            retries: self.retries,
            counters: Arc::clone(&self.counters),
            driver: Weak::clone(&self.driver),
        }
    }
}

#[async_trait]
impl QueuedJob for EphemeralItem {
    fn id(&self) -> &str {
        &self.job.id
    }

    fn pipeline(&self) -> &str {
        self.job.pipeline()
    }

    fn priority(&self) -> Priority {
        self.job.priority()
    }

    fn body(&self) -> &[u8] {
        &self.job.body
    }

    fn context(&self) -> Result<Vec<u8>, DriverError> {
        Ok(self.job.context(DRIVER_NAME)?)
    }

    async fn ack(&self) -> Result<(), DriverError> {
        self.counters.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn nack(&self) -> Result<(), DriverError> {
        self.counters.nacked.fetch_add(1, Ordering::Relaxed);

        let Some(driver) = self.driver.upgrade() else {
            return Ok(());
        };
        if driver.is_stopped() {
            return Ok(());
        }

        if self.attempt < self.retries {
            // never block here: the caller is a poller, the queue's only consumer
            driver
                .queue()
                .try_insert(Box::new(self.redelivery()))
                .map_err(|(e, _)| DriverError::Queue(e))?;
            self.counters.requeued.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        driver.emit(
            JobEvent::new(EventKind::PipeError)
                .pipeline(self.job.pipeline())
                .job_id(self.job.id.clone())
                .error(format!(
                    "job dropped after {} delivery attempts",
                    self.attempt + 1
                )),
        );
        Ok(())
    }
}
