use thiserror::Error;

#[derive(Debug, Error)]
pub enum RatesError {
    #[error("rate unavailable for {from}/{to}")]
    RateUnavailable { from: String, to: String },

    #[error("amount must be positive")]
    InvalidAmount,

    #[error(transparent)]
    Money(#[from] fx_common::MoneyError),

    #[error(transparent)]
    Provider(#[from] anyhow::Error),
}
