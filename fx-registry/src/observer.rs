//! Registry-internal observers: synchronous notifications of entity
//! lifecycle transitions, run in registration order.
//!
//! This is distinct from the application [`fx_eventbus`]-style event bus --
//! these observers exist for local invariants (metrics, validation side
//! effects, cache invalidation in a wrapping layer), not for cross-service
//! asynchronous dispatch. See the design notes on why the two are kept
//! separate even where an implementation might be tempted to unify them.

/// A registry lifecycle event, emitted synchronously to every registered
/// [`Observer`] in registration order.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    Registered { id: String },
    Updated { id: String },
    Unregistered { id: String },
    Activated { id: String },
    Deactivated { id: String },
}

pub trait Observer: Send + Sync {
    fn on_event(&self, event: &RegistryEvent);
}

impl<F> Observer for F
where
    F: Fn(&RegistryEvent) + Send + Sync,
{
    fn on_event(&self, event: &RegistryEvent) {
        self(event)
    }
}
