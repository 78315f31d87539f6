// Relay Infrastructure - In-Memory Broker
// Implements: Driver, DriverConstructor, QueuedJob

pub mod driver;
pub mod item;

pub use driver::{CounterSnapshot, EphemeralConstructor, EphemeralDriver, DRIVER_NAME};
pub use item::EphemeralItem;
