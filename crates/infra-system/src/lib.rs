// Relay Infrastructure - System Adapters
// Implements: Executor, ExecutorFactory

pub mod process_pool;

pub use process_pool::{ProcessPool, ProcessPoolFactory, CONTEXT_ENV};
