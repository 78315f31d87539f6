// Application Layer - jobs orchestration

pub mod event_bus;
pub mod event_logger;
pub mod executor_handle;
pub mod jobs;
pub mod poller;
pub mod priority_queue;
pub mod registry;

// Re-exports
pub use event_bus::{EventBus, EventListener, RecordingListener};
pub use event_logger::EventLogger;
pub use executor_handle::{ExecutorHandle, JOBS_ENV};
pub use jobs::JobsService;
pub use poller::{shutdown_channel, Dispatch, Poller, PollerPool, ShutdownSender, ShutdownToken};
pub use priority_queue::{JobQueue, Prioritized, PriorityQueue, QueueError, Reservation};
pub use registry::{DriverRegistry, PipelineRegistry};
