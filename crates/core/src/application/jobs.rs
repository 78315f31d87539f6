// Jobs Service - pipeline/driver registry lifecycle and caller API
//
// Declare, Destroy and the serve walk are serialized by `lifecycle`; Push,
// List, Pause and Resume are lock-free readers of the registries. Declare
// binds the driver before publishing the pipeline and Destroy unpublishes the
// pipeline before unbinding the driver, so readers never see a pipeline whose
// driver is half-constructed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::event_bus::EventBus;
use super::event_logger::EventLogger;
use super::executor_handle::ExecutorHandle;
use super::poller::PollerPool;
use super::priority_queue::{JobQueue, PriorityQueue};
use super::registry::{DriverRegistry, PipelineRegistry};
use crate::config::JobsConfig;
use crate::domain::{EventKind, Job, JobEvent, Pipeline};
use crate::error::{op, JobsError, Result};
use crate::port::{Driver, DriverConstructor, ExecutorFactory};
use crate::PLUGIN_NAME;

/// Config key drivers read their pipeline options from
fn config_key(pipeline: &str) -> String {
    format!("{}.pipelines.{}", PLUGIN_NAME, pipeline)
}

pub struct JobsService {
    cfg: JobsConfig,
    /// initial set of the pipelines to consume
    consume: HashSet<String>,
    events: Arc<EventBus>,
    queue: Arc<JobQueue>,
    pipelines: PipelineRegistry,
    drivers: DriverRegistry,
    executor: Arc<ExecutorHandle>,
    pollers: PollerPool,
    lifecycle: Mutex<()>,
}

impl JobsService {
    /// Build the service from the `jobs` configuration section.
    ///
    /// A missing section disables the service (`JobsError::Disabled`).
    pub fn new(cfg: Option<JobsConfig>, executor_factory: Arc<dyn ExecutorFactory>) -> Result<Self> {
        let mut cfg = cfg.ok_or_else(|| JobsError::Disabled {
            op: op::INIT,
            section: PLUGIN_NAME.to_string(),
        })?;
        cfg.init_defaults();

        let events = Arc::new(EventBus::new());
        events.add_listener(Arc::new(EventLogger));

        let queue = Arc::new(PriorityQueue::new(cfg.pipeline_size));
        let executor = Arc::new(ExecutorHandle::new(executor_factory, cfg.pool.clone()));
        let pollers = PollerPool::new(
            Arc::clone(&queue),
            Arc::clone(&executor),
            Arc::clone(&events),
        );

        let pipelines = PipelineRegistry::new();
        for pipe in cfg.pipelines.values() {
            pipelines.insert(Arc::new(pipe.clone()));
        }

        Ok(Self {
            consume: cfg.consume.iter().cloned().collect(),
            cfg,
            events,
            queue,
            pipelines,
            drivers: DriverRegistry::new(),
            executor,
            pollers,
            lifecycle: Mutex::new(()),
        })
    }

    /// Collect a driver constructor. Only possible before the service is shared.
    pub fn register_driver(&mut self, driver: impl Into<String>, constructor: Arc<dyn DriverConstructor>) {
        self.drivers.register_constructor(driver, constructor);
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn config(&self) -> &JobsConfig {
        &self.cfg
    }

    /// Activate configured pipelines, build the worker pool and start pollers.
    ///
    /// The first failing pipeline aborts serving.
    pub async fn serve(&self) -> Result<()> {
        {
            let _lifecycle = self.lifecycle.lock().await;

            for pipe in self.pipelines.snapshot() {
                let started = Instant::now();

                if self.drivers.consumer(pipe.name()).is_some() {
                    continue;
                }

                let Some(constructor) = self.drivers.constructor(pipe.driver()) else {
                    // the pipeline exists but stays inactive until its driver type registers
                    self.events.push(
                        JobEvent::new(EventKind::DriverReady)
                            .pipeline(pipe.name())
                            .driver(pipe.driver())
                            .timed(started),
                    );
                    continue;
                };

                let driver = constructor
                    .construct(
                        &config_key(pipe.name()),
                        Arc::clone(&self.events),
                        Arc::clone(&self.queue),
                    )
                    .await
                    .map_err(|e| JobsError::driver_failed(op::SERVE, &pipe, format!("driver construction failed: {}", e), e))?;

                let consume = self.consume.contains(pipe.name());
                self.activate(op::SERVE, &pipe, driver, consume).await?;
            }
        }

        self.executor
            .install()
            .await
            .map_err(|source| JobsError::Execution {
                op: op::SERVE,
                source,
            })?;

        self.pollers.start(self.cfg.num_pollers);
        info!(
            pipelines = self.pipelines.len(),
            pollers = self.cfg.num_pollers,
            "jobs service serving"
        );
        Ok(())
    }

    /// Stop every driver, then the pollers (bounded by the grace period),
    /// then the worker pool.
    pub async fn stop(&self) {
        for (name, driver) in self.drivers.drain() {
            if let Err(e) = driver.stop().await {
                error!(pipeline = %name, error = %e, "stop job driver");
            }
        }

        let grace = self.cfg.shutdown_grace();
        if !self.pollers.stop(grace).await {
            warn!(remaining = self.pollers.running(), "proceeding with pollers still dispatching");
        }

        // abandoned pollers may still hold the executor
        if !self.executor.destroy(grace).await {
            warn!("worker pool destroyed, dispatches still in flight after the grace period");
        }

        self.queue.close();
        info!("jobs service stopped");
    }

    /// Replace the worker pool without stopping the pollers
    pub async fn reset(&self) -> Result<()> {
        info!("JOBS plugin got restart request. Restarting...");

        match self.executor.reset().await {
            Ok(true) => info!("JOBS workers pool successfully restarted"),
            Ok(false) => info!("JOBS workers pool not started yet, nothing to restart"),
            Err(source) => {
                return Err(JobsError::Execution {
                    op: op::RESET,
                    source,
                })
            }
        }
        Ok(())
    }

    /// Route a job to its pipeline's driver
    pub async fn push(&self, job: Job) -> Result<()> {
        self.push_one(op::PUSH, job).await
    }

    /// Push jobs in order, stopping at the first failure. Jobs pushed before
    /// the failing one stay pushed.
    pub async fn push_batch(&self, jobs: Vec<Job>) -> Result<()> {
        for job in jobs {
            self.push_one(op::PUSH_BATCH, job).await?;
        }
        Ok(())
    }

    pub async fn pause(&self, pipelines: &[String]) {
        for name in pipelines {
            if let Some((pipe, driver)) = self.resolve_for_toggle(name) {
                // redirect call to the underlying driver
                driver.pause(pipe.name()).await;
            }
        }
    }

    pub async fn resume(&self, pipelines: &[String]) {
        for name in pipelines {
            if let Some((pipe, driver)) = self.resolve_for_toggle(name) {
                driver.resume(pipe.name()).await;
            }
        }
    }

    /// Declare a pipeline at runtime
    pub async fn declare(&self, pipeline: Pipeline) -> Result<()> {
        let op = op::DECLARE;
        if pipeline.name().is_empty() {
            return Err(JobsError::construction(op, &pipeline, "pipeline has no name"));
        }
        if pipeline.driver().is_empty() {
            return Err(JobsError::construction(
                op,
                &pipeline,
                format!(
                    "no associated driver with the pipeline, pipeline name: {}",
                    pipeline.name()
                ),
            ));
        }

        let _lifecycle = self.lifecycle.lock().await;

        if self.pipelines.contains(pipeline.name()) {
            return Err(JobsError::AlreadyDeclared {
                op,
                pipeline: pipeline.name().to_string(),
            });
        }

        let constructor = self.drivers.constructor(pipeline.driver()).ok_or_else(|| {
            JobsError::construction(op, &pipeline, "driver type is not registered")
        })?;

        let driver = constructor
            .from_pipeline(&pipeline, Arc::clone(&self.events), Arc::clone(&self.queue))
            .await
            .map_err(|e| JobsError::driver_failed(op, &pipeline, format!("driver construction failed: {}", e), e))?;

        let consume = self.consume.contains(pipeline.name()) || pipeline.bool("consume", false);
        self.activate(op, &pipeline, driver, consume).await?;

        self.pipelines.insert(Arc::new(pipeline));
        Ok(())
    }

    /// Destroy a pipeline and release its driver.
    ///
    /// Registry removal is not rolled back if the driver fails to stop.
    pub async fn destroy(&self, name: &str) -> Result<()> {
        let op = op::DESTROY;
        let _lifecycle = self.lifecycle.lock().await;

        let pipe = self.pipelines.get(name).ok_or_else(|| JobsError::NotFound {
            op,
            pipeline: name.to_string(),
        })?;

        let driver = self
            .drivers
            .consumer(pipe.name())
            .ok_or_else(|| JobsError::DriverUnregistered {
                op,
                pipeline: pipe.name().to_string(),
                driver: pipe.driver().to_string(),
            })?;

        self.pipelines.remove(pipe.name());
        self.drivers.unbind(pipe.name());

        driver.stop().await.map_err(|source| JobsError::Stop {
            op,
            pipeline: pipe.name().to_string(),
            driver: pipe.driver().to_string(),
            source,
        })
    }

    /// Names of all registered pipelines, unordered
    pub fn list(&self) -> Vec<String> {
        self.pipelines.names()
    }

    async fn push_one(&self, op: &'static str, mut job: Job) -> Result<()> {
        // get the pipeline for the job
        let pipe = self
            .pipelines
            .get(job.pipeline())
            .ok_or_else(|| JobsError::NotFound {
                op,
                pipeline: job.pipeline().to_string(),
            })?;

        let driver = self
            .drivers
            .consumer(pipe.name())
            .ok_or_else(|| JobsError::DriverUnregistered {
                op,
                pipeline: pipe.name().to_string(),
                driver: pipe.driver().to_string(),
            })?;

        // if job has no priority, inherit it from the pipeline
        job.inherit_priority(pipe.priority());

        driver.push(job).await.map_err(|source| JobsError::Push {
            op,
            pipeline: pipe.name().to_string(),
            source,
        })
    }

    /// Register (and optionally run) a freshly built driver, then bind it.
    /// On failure the driver is stopped and nothing is bound.
    async fn activate(
        &self,
        op: &'static str,
        pipe: &Pipeline,
        driver: Arc<dyn Driver>,
        consume: bool,
    ) -> Result<()> {
        let started = Instant::now();

        if let Err(e) = driver.register(pipe).await {
            self.discard(pipe, driver.as_ref()).await;
            let reason = format!(
                "pipe register failed for the driver: {} with pipe name: {}: {}",
                pipe.driver(),
                pipe.name(),
                e
            );
            return Err(JobsError::driver_failed(op, pipe, reason, e));
        }

        self.events.push(
            JobEvent::new(EventKind::Initialized)
                .pipeline(pipe.name())
                .driver(pipe.driver())
                .timed(started),
        );

        if consume {
            if let Err(e) = driver.run(pipe).await {
                self.discard(pipe, driver.as_ref()).await;
                let reason = format!("pipe run failed: {}", e);
                return Err(JobsError::driver_failed(op, pipe, reason, e));
            }

            self.events.push(
                JobEvent::new(EventKind::PipeRun)
                    .pipeline(pipe.name())
                    .driver(pipe.driver())
                    .timed(started),
            );
        }

        self.drivers.bind(pipe.name(), driver);
        Ok(())
    }

    async fn discard(&self, pipe: &Pipeline, driver: &dyn Driver) {
        if let Err(e) = driver.stop().await {
            debug!(pipeline = %pipe.name(), error = %e, "stop of a driver that failed to activate");
        }
    }

    fn resolve_for_toggle(&self, name: &str) -> Option<(Arc<Pipeline>, Arc<dyn Driver>)> {
        let Some(pipe) = self.pipelines.get(name) else {
            error!(requested = %name, "no such pipeline");
            return None;
        };

        let Some(driver) = self.drivers.consumer(pipe.name()) else {
            warn!(pipeline = %name, "driver for the pipeline not found");
            return None;
        };

        Some((pipe, driver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::port::driver::{MockDriver, MockDriverConstructor};
    use crate::port::executor::mocks::MockExecutorFactory;
    use crate::port::DriverError;

    fn config(pipelines: Vec<Pipeline>, consume: &[&str]) -> JobsConfig {
        JobsConfig {
            num_pollers: 2,
            pipelines: pipelines
                .into_iter()
                .map(|p| (p.name().to_string(), p))
                .collect(),
            consume: consume.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn service(pipelines: Vec<Pipeline>, consume: &[&str]) -> JobsService {
        JobsService::new(
            Some(config(pipelines, consume)),
            Arc::new(MockExecutorFactory::new_success()),
        )
        .unwrap()
    }

    fn healthy_driver() -> MockDriver {
        let mut driver = MockDriver::new();
        driver.expect_register().returning(|_| Ok(()));
        driver.expect_run().returning(|_| Ok(()));
        driver.expect_stop().returning(|| Ok(()));
        driver.expect_push().returning(|_| Ok(()));
        driver.expect_pause().return_const(());
        driver.expect_resume().return_const(());
        driver
    }

    fn healthy_constructor() -> MockDriverConstructor {
        let mut ctor = MockDriverConstructor::new();
        ctor.expect_construct()
            .returning(|_, _, _| Ok(Arc::new(healthy_driver()) as Arc<dyn Driver>));
        ctor.expect_from_pipeline()
            .returning(|_, _, _| Ok(Arc::new(healthy_driver()) as Arc<dyn Driver>));
        ctor
    }

    /// Constructor handing out one prepared driver
    fn constructor_for(driver: MockDriver) -> MockDriverConstructor {
        let mut ctor = MockDriverConstructor::new();
        ctor.expect_from_pipeline()
            .return_once(move |_, _, _| Ok(Arc::new(driver) as Arc<dyn Driver>));
        ctor
    }

    #[test]
    fn test_missing_section_disables() {
        let err = JobsService::new(None, Arc::new(MockExecutorFactory::new_success()))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Disabled);
    }

    #[tokio::test]
    async fn test_declare_then_list() {
        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(healthy_constructor()));

        svc.declare(Pipeline::new("p1", "memory")).await.unwrap();
        assert_eq!(svc.list(), vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn test_declare_twice_conflicts() {
        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(healthy_constructor()));

        svc.declare(Pipeline::new("p1", "memory")).await.unwrap();
        let err = svc.declare(Pipeline::new("p1", "memory")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyDeclared);
        assert_eq!(svc.list().len(), 1);
    }

    #[tokio::test]
    async fn test_declare_without_driver_field() {
        let svc = service(vec![], &[]);

        let err = svc.declare(Pipeline::new("p1", "")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(!err.is_driver_failure());
        assert!(svc.list().is_empty());
    }

    #[tokio::test]
    async fn test_declare_unregistered_driver_type() {
        let svc = service(vec![], &[]);

        let err = svc
            .declare(Pipeline::new("p1", "unknown"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(!err.is_driver_failure());
        assert!(svc.list().is_empty());
    }

    #[tokio::test]
    async fn test_declare_register_failure_stores_nothing() {
        let mut driver = MockDriver::new();
        driver
            .expect_register()
            .returning(|_| Err(DriverError::Broker("topology".to_string())));
        driver.expect_stop().times(1).returning(|| Ok(()));

        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(constructor_for(driver)));

        let err = svc.declare(Pipeline::new("p1", "memory")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert!(err.is_driver_failure());
        assert!(err.to_string().contains("topology"));
        assert!(svc.list().is_empty());
        assert_eq!(svc.drivers.consumer_count(), 0);
    }

    #[tokio::test]
    async fn test_declare_runs_when_consume_option_set() {
        let mut driver = MockDriver::new();
        driver.expect_register().times(1).returning(|_| Ok(()));
        driver
            .expect_run()
            .withf(|p: &Pipeline| p.name() == "p1")
            .times(1)
            .returning(|_| Ok(()));

        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(constructor_for(driver)));

        svc.declare(Pipeline::new("p1", "memory").with("consume", true))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_declare_single_winner() {
        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(healthy_constructor()));
        let svc = Arc::new(svc);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.declare(Pipeline::new("p1", "memory")).await })
            })
            .collect();

        let mut ok = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => ok += 1,
                Err(e) => {
                    assert_eq!(e.kind(), ErrorKind::AlreadyDeclared);
                    conflicts += 1;
                }
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(conflicts, 7);
        assert_eq!(svc.drivers.consumer_count(), 1);
    }

    #[tokio::test]
    async fn test_push_inherits_pipeline_priority() {
        let mut driver = MockDriver::new();
        driver.expect_register().returning(|_| Ok(()));
        driver
            .expect_push()
            .withf(|job: &Job| job.priority() == 7)
            .times(1)
            .returning(|_| Ok(()));

        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(constructor_for(driver)));
        svc.declare(Pipeline::new("p1", "memory").with_priority(7))
            .await
            .unwrap();

        svc.push(Job::new("job", "1", "p1", "body")).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_keeps_explicit_priority() {
        let mut driver = MockDriver::new();
        driver.expect_register().returning(|_| Ok(()));
        driver
            .expect_push()
            .withf(|job: &Job| job.priority() == 2)
            .times(1)
            .returning(|_| Ok(()));

        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(constructor_for(driver)));
        svc.declare(Pipeline::new("p1", "memory").with_priority(7))
            .await
            .unwrap();

        svc.push(Job::new("job", "1", "p1", "body").with_priority(2))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_unknown_pipeline() {
        let svc = service(vec![], &[]);

        let err = svc
            .push(Job::new("job", "1", "missing", "body"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(svc.queue().len(), 0);
    }

    #[tokio::test]
    async fn test_push_driver_failure() {
        let mut driver = MockDriver::new();
        driver.expect_register().returning(|_| Ok(()));
        driver.expect_push().returning(|_| Err(DriverError::Closed));

        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(constructor_for(driver)));
        svc.declare(Pipeline::new("p1", "memory")).await.unwrap();

        let err = svc.push(Job::new("job", "1", "p1", "body")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Push);
    }

    #[tokio::test]
    async fn test_push_batch_stops_at_first_failure() {
        let mut driver = MockDriver::new();
        driver.expect_register().returning(|_| Ok(()));
        driver.expect_push().times(1).returning(|_| Ok(()));

        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(constructor_for(driver)));
        svc.declare(Pipeline::new("p1", "memory")).await.unwrap();

        let err = svc
            .push_batch(vec![
                Job::new("job", "1", "p1", "a"),
                Job::new("job", "2", "missing", "b"),
                Job::new("job", "3", "p1", "c"),
            ])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_inactive_pipeline_has_no_driver() {
        // configured with a driver type nobody registered
        let svc = service(vec![Pipeline::new("p1", "amqp")], &[]);
        svc.serve().await.unwrap();

        let err = svc.push(Job::new("job", "1", "p1", "body")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DriverUnregistered);

        let err = svc.destroy("p1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DriverUnregistered);
        assert_eq!(svc.list(), vec!["p1".to_string()]);

        svc.stop().await;
    }

    #[tokio::test]
    async fn test_destroy_then_push() {
        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(healthy_constructor()));
        svc.declare(Pipeline::new("p1", "memory")).await.unwrap();

        svc.destroy("p1").await.unwrap();
        assert!(svc.list().is_empty());

        let err = svc.push(Job::new("job", "1", "p1", "body")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = svc.destroy("p1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_destroy_stop_failure_still_removes() {
        let mut driver = MockDriver::new();
        driver.expect_register().returning(|_| Ok(()));
        driver
            .expect_stop()
            .times(1)
            .returning(|| Err(DriverError::Broker("connection lost".to_string())));

        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(constructor_for(driver)));
        svc.declare(Pipeline::new("p1", "memory")).await.unwrap();

        let err = svc.destroy("p1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stop);
        assert!(svc.list().is_empty());
        assert_eq!(svc.drivers.consumer_count(), 0);
    }

    #[tokio::test]
    async fn test_pause_continues_past_unknown_pipelines() {
        let mut driver = MockDriver::new();
        driver.expect_register().returning(|_| Ok(()));
        driver
            .expect_pause()
            .withf(|name: &str| name == "p1")
            .times(1)
            .return_const(());
        driver
            .expect_resume()
            .withf(|name: &str| name == "p1")
            .times(1)
            .return_const(());

        let mut svc = service(vec![], &[]);
        svc.register_driver("memory", Arc::new(constructor_for(driver)));
        svc.declare(Pipeline::new("p1", "memory")).await.unwrap();

        let names = vec!["missing".to_string(), "p1".to_string()];
        svc.pause(&names).await;
        svc.resume(&names).await;
    }

    #[tokio::test]
    async fn test_serve_runs_only_consumed_pipelines() {
        let mut ctor = MockDriverConstructor::new();
        ctor.expect_construct()
            .withf(|key: &str, _, _| key == "jobs.pipelines.hot")
            .times(1)
            .returning(|_, _, _| {
                let mut driver = MockDriver::new();
                driver.expect_register().times(1).returning(|_| Ok(()));
                driver.expect_run().times(1).returning(|_| Ok(()));
                driver.expect_stop().returning(|| Ok(()));
                Ok(Arc::new(driver) as Arc<dyn Driver>)
            });
        ctor.expect_construct()
            .withf(|key: &str, _, _| key == "jobs.pipelines.cold")
            .times(1)
            .returning(|_, _, _| {
                let mut driver = MockDriver::new();
                driver.expect_register().times(1).returning(|_| Ok(()));
                driver.expect_run().never();
                driver.expect_stop().returning(|| Ok(()));
                Ok(Arc::new(driver) as Arc<dyn Driver>)
            });

        let mut svc = service(
            vec![Pipeline::new("hot", "memory"), Pipeline::new("cold", "memory")],
            &["hot"],
        );
        svc.register_driver("memory", Arc::new(ctor));

        svc.serve().await.unwrap();
        assert_eq!(svc.drivers.consumer_count(), 2);
        assert_eq!(svc.pollers.running(), 2);

        svc.stop().await;
        assert_eq!(svc.drivers.consumer_count(), 0);
        assert!(svc.queue().is_closed());
    }

    #[tokio::test]
    async fn test_serve_aborts_on_register_failure() {
        let mut ctor = MockDriverConstructor::new();
        ctor.expect_construct().returning(|_, _, _| {
            let mut driver = MockDriver::new();
            driver
                .expect_register()
                .returning(|_| Err(DriverError::Broker("down".to_string())));
            driver.expect_stop().returning(|| Ok(()));
            Ok(Arc::new(driver) as Arc<dyn Driver>)
        });

        let mut svc = service(vec![Pipeline::new("p1", "memory")], &[]);
        svc.register_driver("memory", Arc::new(ctor));

        let err = svc.serve().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert_eq!(svc.pollers.running(), 0);
    }

    #[tokio::test]
    async fn test_reset_before_serve_is_noop() {
        let factory = MockExecutorFactory::new_success();
        let svc = JobsService::new(Some(config(vec![], &[])), Arc::new(factory.clone())).unwrap();

        svc.reset().await.unwrap();
        assert_eq!(factory.builds(), 0);
    }

    #[tokio::test]
    async fn test_reset_rebuilds_pool() {
        let factory = MockExecutorFactory::new_success();
        let svc = JobsService::new(Some(config(vec![], &[])), Arc::new(factory.clone())).unwrap();
        svc.serve().await.unwrap();

        svc.reset().await.unwrap();
        assert_eq!(factory.builds(), 2);
        assert_eq!(factory.destroys(), 1);

        factory.set_fail_builds(true);
        let err = svc.reset().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        svc.stop().await;
    }
}
