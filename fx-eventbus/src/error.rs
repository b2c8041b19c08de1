use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("event bus emit failed: {0}")]
    EmitFailed(String),

    #[error("unsupported event bus driver: {0}")]
    UnsupportedDriver(String),
}
