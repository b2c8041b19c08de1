use thiserror::Error;

/// Errors surfaced to callers of [`crate::Registry`]. Persistence, cache, and
/// observer failures are logged and swallowed instead -- see the module docs.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The validator rejected a mutation. Surfaced to the caller.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// No entity with this id exists. Surfaced to the caller.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// The registry is at its configured `max_entities`. Surfaced.
    #[error("registry capacity exceeded (max {max})")]
    CapacityExceeded { max: usize },
}
