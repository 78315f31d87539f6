// Executor Port
// Abstraction over the worker pool jobs are executed by

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::PoolConfig;

/// What a worker receives (and answers with)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub context: Vec<u8>,
    pub body: Vec<u8>,
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// No usable executor is installed (a reset failed or serve never ran)
    #[error("worker pool unavailable")]
    Unavailable,

    #[error("job context resolution failed: {0}")]
    Context(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Worker timeout after {0}ms")]
    Timeout(u64),

    #[error("Worker failed (exit code {code:?}): {stderr}")]
    Failed { code: Option<i32>, stderr: String },

    #[error("IO error: {0}")]
    IoError(String),

    #[error("worker pool destroyed")]
    Destroyed,

    #[error("worker pool panicked: {0}")]
    Panicked(String),
}

/// Worker pool handle invoked once per dequeued job
#[async_trait]
pub trait Executor: Send + Sync {
    async fn exec(&self, payload: Payload) -> Result<Payload, ExecutionError>;

    /// Tear down workers; subsequent `exec` calls fail. Calling it twice is a no-op.
    async fn destroy(&self);
}

/// Builds worker pools; used at serve time and on every reset
#[async_trait]
pub trait ExecutorFactory: Send + Sync {
    async fn new_pool(
        &self,
        config: &PoolConfig,
        env: &HashMap<String, String>,
    ) -> Result<Arc<dyn Executor>, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock executor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed, echoing the body back
        Success,
        /// Always fail with message
        Fail(String),
    }

    #[derive(Default)]
    struct Shared {
        executed: Mutex<Vec<Payload>>,
        torn: AtomicUsize,
        builds: AtomicUsize,
        destroys: AtomicUsize,
        fail_builds: AtomicBool,
    }

    /// Mock worker pool; every instance built by one factory records into the same log
    pub struct MockExecutor {
        behavior: MockBehavior,
        delay: Option<Duration>,
        destroyed: AtomicBool,
        shared: Arc<Shared>,
    }

    #[async_trait]
    impl Executor for MockExecutor {
        async fn exec(&self, payload: Payload) -> Result<Payload, ExecutionError> {
            if self.destroyed.load(Ordering::SeqCst) {
                self.shared.torn.fetch_add(1, Ordering::SeqCst);
                return Err(ExecutionError::Destroyed);
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            // destroyed while the call was in flight
            if self.destroyed.load(Ordering::SeqCst) {
                self.shared.torn.fetch_add(1, Ordering::SeqCst);
                return Err(ExecutionError::Destroyed);
            }

            self.shared.executed.lock().push(payload.clone());

            match &self.behavior {
                MockBehavior::Success => Ok(Payload {
                    context: Vec::new(),
                    body: payload.body,
                }),
                MockBehavior::Fail(msg) => Err(ExecutionError::Failed {
                    code: Some(1),
                    stderr: msg.clone(),
                }),
            }
        }

        async fn destroy(&self) {
            if self.destroyed.swap(true, Ordering::SeqCst) {
                return;
            }
            self.shared.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Factory producing [`MockExecutor`]s
    #[derive(Clone)]
    pub struct MockExecutorFactory {
        behavior: MockBehavior,
        delay: Option<Duration>,
        shared: Arc<Shared>,
    }

    impl MockExecutorFactory {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                delay: None,
                shared: Arc::new(Shared::default()),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        /// Every exec sleeps for `delay` before answering
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Make subsequent `new_pool` calls fail (or succeed again)
        pub fn set_fail_builds(&self, fail: bool) {
            self.shared.fail_builds.store(fail, Ordering::SeqCst);
        }

        /// Payloads executed successfully or not, in call order
        pub fn executed(&self) -> Vec<Payload> {
            self.shared.executed.lock().clone()
        }

        /// Executed bodies as UTF-8 strings
        pub fn executed_bodies(&self) -> Vec<String> {
            self.executed()
                .into_iter()
                .map(|p| String::from_utf8_lossy(&p.body).to_string())
                .collect()
        }

        /// Calls that observed a destroyed executor
        pub fn torn_calls(&self) -> usize {
            self.shared.torn.load(Ordering::SeqCst)
        }

        pub fn builds(&self) -> usize {
            self.shared.builds.load(Ordering::SeqCst)
        }

        pub fn destroys(&self) -> usize {
            self.shared.destroys.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExecutorFactory for MockExecutorFactory {
        async fn new_pool(
            &self,
            _config: &PoolConfig,
            _env: &HashMap<String, String>,
        ) -> Result<Arc<dyn Executor>, ExecutionError> {
            if self.shared.fail_builds.load(Ordering::SeqCst) {
                return Err(ExecutionError::SpawnFailed("mock build failure".to_string()));
            }
            self.shared.builds.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockExecutor {
                behavior: self.behavior.clone(),
                delay: self.delay,
                destroyed: AtomicBool::new(false),
                shared: Arc::clone(&self.shared),
            }))
        }
    }
}
