//! Shared wiring for the end-to-end suites: a jobs service with the
//! ephemeral driver registered and a mock worker pool.

#![allow(dead_code)]

use relay_core::application::RecordingListener;
use relay_core::domain::{Job, Pipeline};
use relay_core::port::executor::mocks::MockExecutorFactory;
use relay_core::{JobsConfig, JobsService};
use relay_infra_memory::{EphemeralConstructor, DRIVER_NAME};
use std::sync::Arc;
use std::time::Duration;

pub struct Harness {
    pub jobs: Arc<JobsService>,
    pub executor: MockExecutorFactory,
    pub ephemeral: Arc<EphemeralConstructor>,
    pub events: Arc<RecordingListener>,
}

pub fn harness(num_pollers: usize, executor: MockExecutorFactory) -> Harness {
    let cfg = JobsConfig {
        num_pollers,
        shutdown_grace: 1,
        ..Default::default()
    };

    let mut jobs = JobsService::new(Some(cfg), Arc::new(executor.clone())).unwrap();
    let ephemeral = Arc::new(EphemeralConstructor::new());
    jobs.register_driver(DRIVER_NAME, ephemeral.clone());

    let events = RecordingListener::new();
    jobs.events().add_listener(events.clone());

    Harness {
        jobs: Arc::new(jobs),
        executor,
        ephemeral,
        events,
    }
}

/// Ephemeral pipeline that starts consuming as soon as it is declared
pub fn consumed(name: &str) -> Pipeline {
    Pipeline::new(name, DRIVER_NAME).with("consume", true)
}

pub fn job(pipeline: &str, body: &str) -> Job {
    Job::new("test_job", body, pipeline, body.as_bytes().to_vec())
}

/// Poll `cond` until it holds, failing the test after 5 seconds
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
