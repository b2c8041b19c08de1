//! The [`EventBus`] trait: a uniform publish/subscribe interface over the
//! memory, Redis, and Kafka drivers.

use std::{future::Future, pin::Pin, sync::Arc};

use async_trait::async_trait;

use crate::event::{Event, EventType};

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A registered event handler. Handlers are cheap closures capturing their
/// dependencies (persistence, logger, ...) by `Arc`.
pub type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Registers `handler` for `event_type`. Later registrations for the
    /// same type append, all are invoked on every matching event.
    fn register(&self, event_type: EventType, handler: Handler);

    /// Publishes `event`. For async backends, returns once the event is
    /// durably enqueued, not once every handler has run.
    async fn emit(&self, event: Event) -> anyhow::Result<()>;
}
