//! Typed event publish/subscribe over three interchangeable backends: an
//! in-memory async bus, Redis Streams with consumer groups and a DLQ, and
//! Kafka with consumer groups and a DLQ topic.

pub mod bus;
pub mod error;
pub mod event;
pub mod kafka_bus;
pub mod memory;
pub mod redis_bus;
pub mod select;

pub use bus::{EventBus, Handler, HandlerFuture};
pub use error::EventBusError;
pub use event::{Event, EventType};
pub use kafka_bus::KafkaBus;
pub use memory::MemoryBus;
pub use redis_bus::RedisBus;
pub use select::build_bus;
