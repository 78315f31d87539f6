// Jobs Service Configuration
// Deserialized from the `jobs` section; validated loosely, defaults filled in by `init_defaults`

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::Pipeline;

/// Default number of concurrent pollers
pub const DEFAULT_NUM_POLLERS: usize = 10;

/// Default internal priority queue capacity
pub const DEFAULT_PIPELINE_SIZE: usize = 1_000_000;

/// Grace period pollers get at shutdown (5 seconds)
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Default per-job worker timeout (60 seconds)
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 60_000;

/// Default time live workers get to exit on pool destroy (5 seconds)
pub const DEFAULT_DESTROY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default)]
    pub num_pollers: usize,

    /// Capacity of the internal priority queue
    #[serde(default)]
    pub pipeline_size: usize,

    /// Seconds pollers get to observe the stop signal
    #[serde(default)]
    pub shutdown_grace: u64,

    #[serde(default)]
    pub pool: PoolConfig,

    /// Pipeline definitions keyed by pipeline name
    #[serde(default)]
    pub pipelines: HashMap<String, Pipeline>,

    /// Pipelines to start consuming at serve time
    #[serde(default)]
    pub consume: Vec<String>,
}

/// Worker pool settings, handed to the executor factory untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Worker command line (program followed by arguments)
    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub num_workers: usize,

    #[serde(default)]
    pub exec_timeout_ms: u64,

    #[serde(default)]
    pub destroy_timeout_ms: u64,

    /// Environment variables inherited by workers
    #[serde(default)]
    pub env_allowlist: Vec<String>,
}

impl JobsConfig {
    pub fn init_defaults(&mut self) {
        if self.num_pollers == 0 {
            self.num_pollers = DEFAULT_NUM_POLLERS;
        }
        if self.pipeline_size == 0 {
            self.pipeline_size = DEFAULT_PIPELINE_SIZE;
        }
        if self.shutdown_grace == 0 {
            self.shutdown_grace = DEFAULT_SHUTDOWN_GRACE_SECS;
        }

        // the map key is the pipeline name
        for (name, pipe) in self.pipelines.iter_mut() {
            pipe.set_name(name.clone());
        }

        self.pool.init_defaults();
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace)
    }
}

impl PoolConfig {
    pub fn init_defaults(&mut self) {
        if self.num_workers == 0 {
            self.num_workers = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1);
        }
        if self.exec_timeout_ms == 0 {
            self.exec_timeout_ms = DEFAULT_EXEC_TIMEOUT_MS;
        }
        if self.destroy_timeout_ms == 0 {
            self.destroy_timeout_ms = DEFAULT_DESTROY_TIMEOUT_MS;
        }
    }
}
