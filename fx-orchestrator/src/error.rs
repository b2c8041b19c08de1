use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("webhook signature invalid")]
    SignatureInvalid,

    #[error("webhook metadata invalid: {0}")]
    MetadataInvalid(String),

    #[error("connected account requires onboarding: {url}")]
    OnboardingRequired { url: String },

    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] fx_common::MoneyError),

    #[error("event bus emit failed: {0}")]
    BusEmitFailed(#[source] anyhow::Error),

    #[error(transparent)]
    Registry(#[from] fx_registry::RegistryError),

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}
