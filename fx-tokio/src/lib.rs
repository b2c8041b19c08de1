//! A crate containing utilities and extensions built on top of Tokio, shared
//! by all the long-lived background tasks in this workspace (the rate
//! refresher, the event bus drivers, the DLQ retry loop).

/// A channel for sending deduplicated notifications with no data attached.
pub mod notify;
/// `ShutdownChannel`, a multi-producer multi-consumer "fire once" signal.
pub mod shutdown;
/// `LxTask` and associated helpers for structured task concurrency.
pub mod task;

/// Default channel buffer size used by broadcast-style channels in this
/// crate, unless a caller has a specific reason to use something else.
pub const DEFAULT_CHANNEL_SIZE: usize = 256;

// Can save a `tokio` dependency declaration downstream.
pub use tokio;
