// Executor Handle - swappable worker pool shared by all pollers
//
// Dispatches hold the read side for the whole exec call; reset holds the
// write side while tearing the old pool down and installing the new one, so
// no dispatch ever sees a half-destroyed pool. Stop is the exception: it
// signals the live pool before waiting for the write side.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use crate::config::PoolConfig;
use crate::port::{ExecutionError, Executor, ExecutorFactory, Payload};

/// Environment variable marking workers spawned for jobs
pub const JOBS_ENV: &str = "RELAY_JOBS";

enum Slot {
    /// Serve has not installed a pool yet (or stop removed it)
    Idle,
    Ready(Arc<dyn Executor>),
    /// The last rebuild failed; dispatches fail until a reset succeeds
    Broken,
}

pub struct ExecutorHandle {
    slot: RwLock<Slot>,
    /// Mirror of the `Ready` pool, reachable while dispatches hold the read side
    current: Mutex<Option<Arc<dyn Executor>>>,
    factory: Arc<dyn ExecutorFactory>,
    config: PoolConfig,
    env: HashMap<String, String>,
}

/// Shared access to the current pool for the duration of one dispatch
pub struct ExecutorGuard<'a> {
    slot: RwLockReadGuard<'a, Slot>,
}

impl ExecutorGuard<'_> {
    pub async fn exec(&self, payload: Payload) -> Result<Payload, ExecutionError> {
        match &*self.slot {
            Slot::Ready(executor) => executor.exec(payload).await,
            Slot::Idle | Slot::Broken => Err(ExecutionError::Unavailable),
        }
    }
}

impl ExecutorHandle {
    pub fn new(factory: Arc<dyn ExecutorFactory>, config: PoolConfig) -> Self {
        let mut env = HashMap::new();
        env.insert(JOBS_ENV.to_string(), "true".to_string());

        Self {
            slot: RwLock::new(Slot::Idle),
            current: Mutex::new(None),
            factory,
            config,
            env,
        }
    }

    /// Build the first pool (serve time)
    pub async fn install(&self) -> Result<(), ExecutionError> {
        let mut slot = self.slot.write().await;
        self.current.lock().take();
        if let Slot::Ready(previous) = std::mem::replace(&mut *slot, Slot::Broken) {
            previous.destroy().await;
        }
        let executor = self.factory.new_pool(&self.config, &self.env).await?;
        self.set_ready(&mut slot, executor);
        Ok(())
    }

    /// Acquire the read side; waits while a reset is in progress
    pub async fn read(&self) -> ExecutorGuard<'_> {
        ExecutorGuard {
            slot: self.slot.read().await,
        }
    }

    /// Replace the pool. Returns `false` when nothing was installed yet (no-op).
    ///
    /// On constructor failure the slot is left `Broken`.
    pub async fn reset(&self) -> Result<bool, ExecutionError> {
        let mut slot = self.slot.write().await;
        self.current.lock().take();

        match std::mem::replace(&mut *slot, Slot::Broken) {
            Slot::Idle => {
                *slot = Slot::Idle;
                debug!("executor reset requested before serve, nothing to replace");
                return Ok(false);
            }
            Slot::Ready(previous) => previous.destroy().await,
            Slot::Broken => info!("rebuilding worker pool after a failed reset"),
        }

        let executor = self.factory.new_pool(&self.config, &self.env).await?;
        self.set_ready(&mut slot, executor);
        Ok(true)
    }

    /// Tear the pool down for good (stop).
    ///
    /// The live pool is destroyed first so in-flight dispatches fail fast and
    /// release the read side. Returns `false` when dispatches still hold it
    /// after `grace`; the slot then keeps the destroyed pool, which refuses work.
    pub async fn destroy(&self, grace: Duration) -> bool {
        let live = self.current.lock().take();
        if let Some(executor) = live {
            executor.destroy().await;
        }

        let Ok(mut slot) = tokio::time::timeout(grace, self.slot.write()).await else {
            return false;
        };
        self.current.lock().take();
        // a reset may have swapped pools in between; destroy is idempotent
        if let Slot::Ready(executor) = std::mem::replace(&mut *slot, Slot::Idle) {
            executor.destroy().await;
        }
        true
    }

    fn set_ready(&self, slot: &mut Slot, executor: Arc<dyn Executor>) {
        *self.current.lock() = Some(Arc::clone(&executor));
        *slot = Slot::Ready(executor);
    }

    pub async fn is_ready(&self) -> bool {
        matches!(&*self.slot.read().await, Slot::Ready(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::executor::mocks::MockExecutorFactory;

    fn payload(body: &str) -> Payload {
        Payload {
            context: b"{}".to_vec(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_exec_before_install_is_unavailable() {
        let handle = ExecutorHandle::new(
            Arc::new(MockExecutorFactory::new_success()),
            PoolConfig::default(),
        );

        let res = handle.read().await.exec(payload("x")).await;
        assert!(matches!(res, Err(ExecutionError::Unavailable)));
    }

    #[tokio::test]
    async fn test_reset_before_install_is_noop() {
        let factory = MockExecutorFactory::new_success();
        let handle = ExecutorHandle::new(Arc::new(factory.clone()), PoolConfig::default());

        assert!(!handle.reset().await.unwrap());
        assert_eq!(factory.builds(), 0);
        assert!(!handle.is_ready().await);
    }

    #[tokio::test]
    async fn test_reset_replaces_pool() {
        let factory = MockExecutorFactory::new_success();
        let handle = ExecutorHandle::new(Arc::new(factory.clone()), PoolConfig::default());

        handle.install().await.unwrap();
        assert!(handle.reset().await.unwrap());

        assert_eq!(factory.builds(), 2);
        assert_eq!(factory.destroys(), 1);
        let echoed = handle.read().await.exec(payload("hello")).await.unwrap();
        assert_eq!(echoed.body, b"hello");
    }

    #[tokio::test]
    async fn test_failed_reset_leaves_handle_broken_until_next_reset() {
        let factory = MockExecutorFactory::new_success();
        let handle = ExecutorHandle::new(Arc::new(factory.clone()), PoolConfig::default());
        handle.install().await.unwrap();

        factory.set_fail_builds(true);
        assert!(handle.reset().await.is_err());
        assert!(!handle.is_ready().await);
        let res = handle.read().await.exec(payload("x")).await;
        assert!(matches!(res, Err(ExecutionError::Unavailable)));

        factory.set_fail_builds(false);
        assert!(handle.reset().await.unwrap());
        assert!(handle.read().await.exec(payload("x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_destroy_returns_to_idle() {
        let factory = MockExecutorFactory::new_success();
        let handle = ExecutorHandle::new(Arc::new(factory.clone()), PoolConfig::default());
        handle.install().await.unwrap();

        assert!(handle.destroy(Duration::from_secs(1)).await);

        assert_eq!(factory.destroys(), 1);
        assert!(!handle.is_ready().await);
        assert!(!handle.reset().await.unwrap());
    }

    #[tokio::test]
    async fn test_destroy_signals_pool_while_dispatch_in_flight() {
        let factory = MockExecutorFactory::new_success().with_delay(Duration::from_millis(300));
        let handle = Arc::new(ExecutorHandle::new(
            Arc::new(factory.clone()),
            PoolConfig::default(),
        ));
        handle.install().await.unwrap();

        let dispatch = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.read().await.exec(payload("slow")).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // the dispatch still holds the read side, yet the pool is already torn down
        assert!(!handle.destroy(Duration::from_millis(10)).await);
        assert_eq!(factory.destroys(), 1);

        let res = dispatch.await.unwrap();
        assert!(matches!(res, Err(ExecutionError::Destroyed)));
        assert!(handle.destroy(Duration::from_secs(1)).await);
        assert_eq!(factory.destroys(), 1);
        assert!(!handle.is_ready().await);
    }
}
