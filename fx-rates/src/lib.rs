//! Exchange rate cache, service, and background refresher: a domain overlay
//! on [`fx_registry`] that answers "what is the rate from A to B" and "keep
//! the cache warm" cache-first, with provider fallback.

pub mod cache;
pub mod entities;
pub mod error;
pub mod provider;
pub mod refresher;
pub mod service;

pub use cache::{FetchedRate, RateCache};
pub use entities::{ExchangeRateInfo, LastUpdatedSentinel};
pub use error::RatesError;
pub use provider::ExchangeRateProvider;
pub use service::{ExchangeService, RateInfo};
