// Process pool - one child process per job, bounded by `num_workers`
// reason: tokio::process for async child management, nix for signalling on unix
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::config::PoolConfig;
use relay_core::port::{ExecutionError, Executor, ExecutorFactory, Payload};

/// Environment variable carrying the serialized job context
pub const CONTEXT_ENV: &str = "RELAY_JOB_CONTEXT";

/// Inherited by every worker regardless of the allowlist (program lookup)
const ALWAYS_INHERITED: &[&str] = &["PATH"];

/// Interval at which destroy re-checks live children
const REAP_INTERVAL_MS: u64 = 100;

/// Builds a fresh [`ProcessPool`] on serve and on every reset
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessPoolFactory;

#[async_trait]
impl ExecutorFactory for ProcessPoolFactory {
    async fn new_pool(
        &self,
        config: &PoolConfig,
        env: &HashMap<String, String>,
    ) -> Result<Arc<dyn Executor>, ExecutionError> {
        Ok(Arc::new(ProcessPool::new(config, env)?))
    }
}

/// Subprocess worker pool
/// Children only see allowlisted environment variables plus the pool env
pub struct ProcessPool {
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    slots: Semaphore,
    exec_timeout: Duration,
    destroy_timeout: Duration,
    /// Running children: spawn sequence -> pid
    live: Mutex<HashMap<u64, u32>>,
    next_child: AtomicU64,
    destroyed: CancellationToken,
}

impl ProcessPool {
    pub fn new(config: &PoolConfig, env: &HashMap<String, String>) -> Result<Self, ExecutionError> {
        let mut words = config.command.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| ExecutionError::SpawnFailed("worker command is empty".to_string()))?;

        let mut worker_env = Self::filter_env(std::env::vars(), &config.env_allowlist);
        worker_env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));

        info!(
            command = %config.command,
            workers = config.num_workers,
            "worker pool created"
        );

        Ok(Self {
            program,
            args: words.collect(),
            env: worker_env,
            slots: Semaphore::new(config.num_workers.max(1)),
            exec_timeout: Duration::from_millis(config.exec_timeout_ms),
            destroy_timeout: Duration::from_millis(config.destroy_timeout_ms),
            live: Mutex::new(HashMap::new()),
            next_child: AtomicU64::new(0),
            destroyed: CancellationToken::new(),
        })
    }

    /// Keep allowlisted variables only
    fn filter_env(
        vars: impl IntoIterator<Item = (String, String)>,
        allowlist: &[String],
    ) -> HashMap<String, String> {
        vars.into_iter()
            .filter(|(k, _)| {
                ALWAYS_INHERITED.contains(&k.as_str()) || allowlist.iter().any(|a| a == k)
            })
            .collect()
    }

    /// Number of children currently running
    pub fn live(&self) -> usize {
        self.live.lock().len()
    }

    /// Spawn one child, feed it the body and collect its output
    async fn run_child(&self, payload: Payload) -> Result<std::process::Output, ExecutionError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env_clear()
            .envs(&self.env)
            .env(CONTEXT_ENV, String::from_utf8_lossy(&payload.context).into_owned())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed(e.to_string()))?;

        let seq = self.next_child.fetch_add(1, Ordering::Relaxed);
        if let Some(pid) = child.id() {
            self.live.lock().insert(seq, pid);
        }

        // write concurrently with reading, a chatty child would otherwise block on a full pipe
        if let Some(mut stdin) = child.stdin.take() {
            let body = payload.body;
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&body).await {
                    debug!(error = %e, "worker closed stdin early");
                }
            });
        }

        let result = timeout(self.exec_timeout, child.wait_with_output()).await;
        self.live.lock().remove(&seq);

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ExecutionError::IoError(e.to_string())),
            // dropping the future killed the child (kill_on_drop)
            Err(_) => Err(ExecutionError::Timeout(self.exec_timeout.as_millis() as u64)),
        }
    }

    /// SIGTERM every live child, SIGKILL whatever is left after the destroy timeout
    async fn terminate_children(&self) {
        let pids: Vec<u32> = self.live.lock().values().copied().collect();
        if pids.is_empty() {
            return;
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            info!(children = pids.len(), "Sending SIGTERM to live workers");
            for pid in &pids {
                if let Err(e) = kill(Pid::from_raw(*pid as i32), Signal::SIGTERM) {
                    debug!(pid = %pid, error = %e, "SIGTERM failed");
                }
            }

            let started = Instant::now();
            while self.live() > 0 {
                if started.elapsed() >= self.destroy_timeout {
                    let remaining: Vec<u32> = self.live.lock().values().copied().collect();
                    warn!(children = remaining.len(), "Workers did not exit after SIGTERM, sending SIGKILL");
                    for pid in remaining {
                        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                            debug!(pid = %pid, error = %e, "SIGKILL failed");
                        }
                    }
                    return;
                }
                tokio::time::sleep(Duration::from_millis(REAP_INTERVAL_MS)).await;
            }
            info!("Workers exited gracefully after SIGTERM");
        }

        #[cfg(not(unix))]
        {
            warn!(
                children = pids.len(),
                "graceful termination unsupported on this platform, children are killed when their jobs are dropped"
            );
        }
    }
}

#[async_trait]
impl Executor for ProcessPool {
    async fn exec(&self, payload: Payload) -> Result<Payload, ExecutionError> {
        let _slot = tokio::select! {
            _ = self.destroyed.cancelled() => return Err(ExecutionError::Destroyed),
            slot = self.slots.acquire() => slot.map_err(|_| ExecutionError::Destroyed)?,
        };

        let started = Instant::now();
        let output = self.run_child(payload).await?;

        debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            exit_code = ?output.status.code(),
            "worker finished"
        );

        if !output.status.success() {
            return Err(ExecutionError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(Payload {
            context: Vec::new(),
            body: output.stdout,
        })
    }

    async fn destroy(&self) {
        if self.destroyed.is_cancelled() {
            return;
        }
        self.destroyed.cancel();
        self.slots.close();

        self.terminate_children().await;
        info!("worker pool destroyed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn config(command: &str) -> PoolConfig {
        PoolConfig {
            command: command.to_string(),
            num_workers: 2,
            exec_timeout_ms: 5_000,
            destroy_timeout_ms: 500,
            env_allowlist: vec![],
        }
    }

    fn payload(context: &str, body: &str) -> Payload {
        Payload {
            context: context.as_bytes().to_vec(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn test_body_round_trips_through_stdin() {
        let pool = ProcessPool::new(&config("cat"), &HashMap::new()).unwrap();

        let out = pool.exec(payload("{}", "hello")).await.unwrap();
        assert_eq!(out.body, b"hello");
        assert_eq!(pool.live(), 0);
    }

    #[tokio::test]
    async fn test_context_passed_in_env() {
        let pool = ProcessPool::new(&config("printenv RELAY_JOB_CONTEXT"), &HashMap::new()).unwrap();

        let out = pool.exec(payload(r#"{"id":"1"}"#, "")).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&out.body).trim(), r#"{"id":"1"}"#);
    }

    #[tokio::test]
    async fn test_pool_env_reaches_worker() {
        let mut env = HashMap::new();
        env.insert("RELAY_JOBS".to_string(), "true".to_string());
        let pool = ProcessPool::new(&config("printenv RELAY_JOBS"), &env).unwrap();

        let out = pool.exec(payload("{}", "")).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&out.body).trim(), "true");
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails() {
        let pool = ProcessPool::new(&config("false"), &HashMap::new()).unwrap();

        let err = pool.exec(payload("{}", "")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Failed { code: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_worker() {
        let mut cfg = config("sleep 10");
        cfg.exec_timeout_ms = 100;
        let pool = ProcessPool::new(&cfg, &HashMap::new()).unwrap();

        let err = pool.exec(payload("{}", "")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Timeout(100)));
        assert_eq!(pool.live(), 0);
    }

    #[tokio::test]
    async fn test_missing_program() {
        let pool = ProcessPool::new(&config("relay-no-such-worker"), &HashMap::new()).unwrap();

        let err = pool.exec(payload("{}", "")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::SpawnFailed(_)));
    }

    #[test]
    fn test_empty_command_rejected() {
        let err = ProcessPool::new(&config("  "), &HashMap::new()).err().unwrap();
        assert!(matches!(err, ExecutionError::SpawnFailed(_)));
    }

    #[tokio::test]
    async fn test_destroy_refuses_new_work() {
        let pool = ProcessPool::new(&config("cat"), &HashMap::new()).unwrap();
        pool.destroy().await;

        let err = pool.exec(payload("{}", "late")).await.unwrap_err();
        assert!(matches!(err, ExecutionError::Destroyed));
    }

    #[tokio::test]
    async fn test_destroy_terminates_live_workers() {
        let pool = Arc::new(ProcessPool::new(&config("sleep 10"), &HashMap::new()).unwrap());

        let running = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.exec(payload("{}", "")).await })
        };
        while pool.live() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        pool.destroy().await;
        let result = running.await.unwrap();
        assert!(matches!(result, Err(ExecutionError::Failed { code: None, .. })));
    }

    #[test]
    fn test_env_filtering() {
        let vars = vec![
            ("PATH".to_string(), "/bin".to_string()),
            ("ALLOWED_VAR".to_string(), "value1".to_string()),
            ("BLOCKED_VAR".to_string(), "value2".to_string()),
        ];

        let filtered = ProcessPool::filter_env(vars, &["ALLOWED_VAR".to_string()]);

        assert_eq!(filtered.len(), 2);
        assert!(filtered.contains_key("PATH"));
        assert!(filtered.contains_key("ALLOWED_VAR"));
        assert!(!filtered.contains_key("BLOCKED_VAR"));
    }

    #[tokio::test]
    async fn test_factory_builds_pool() {
        let executor = ProcessPoolFactory
            .new_pool(&config("cat"), &HashMap::new())
            .await
            .unwrap();

        let out = executor.exec(payload("{}", "x")).await.unwrap();
        assert_eq!(out.body, b"x");
    }
}
