// Queued Job Port
// What a driver hands to the priority queue: the job plus enough delivery
// state to acknowledge it through the driver that owns it.

use async_trait::async_trait;

use super::driver::DriverError;
use crate::application::priority_queue::Prioritized;
use crate::domain::Priority;

#[async_trait]
pub trait QueuedJob: Send + Sync {
    fn id(&self) -> &str;

    fn pipeline(&self) -> &str;

    /// Effective priority, resolved at push time
    fn priority(&self) -> Priority;

    fn body(&self) -> &[u8];

    /// Serialized metadata accompanying the body
    fn context(&self) -> Result<Vec<u8>, DriverError>;

    /// Positive acknowledgement back to the owning driver
    async fn ack(&self) -> Result<(), DriverError>;

    /// Negative acknowledgement back to the owning driver
    async fn nack(&self) -> Result<(), DriverError>;
}

impl Prioritized for Box<dyn QueuedJob> {
    fn priority(&self) -> Priority {
        self.as_ref().priority()
    }
}
