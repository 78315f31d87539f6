// Relay Core - Pipeline Registry, Priority Dispatch & Ports
// NO broker or worker-process dependencies: drivers and executors plug in via ports

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{JobsService, PriorityQueue};
pub use config::{JobsConfig, PoolConfig};
pub use error::{ErrorKind, JobsError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Configuration section the jobs service is read from
pub const PLUGIN_NAME: &str = "jobs";
