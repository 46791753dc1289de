//! Lifecycle event mechanics.
//!
//! Lot operations publish their committed lifecycle events here, after the
//! store transaction has completed. Consumers (audit loggers, notification
//! senders) subscribe without ever running inside the store's commit.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
