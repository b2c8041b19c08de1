//! [`ExchangeService`]: cache-first rate lookup and money conversion, with
//! provider fallback on a cache miss.

use std::{collections::HashMap, sync::Arc};

use fx_common::Money;
use tracing::warn;

use crate::{
    cache::{FetchedRate, RateCache},
    entities::ExchangeRateInfo,
    error::RatesError,
    provider::ExchangeRateProvider,
};

/// The answer to "what is the rate from A to B", along with its provenance.
#[derive(Debug, Clone)]
pub struct RateInfo {
    pub from: String,
    pub to: String,
    pub rate: f64,
    pub source: String,
}

impl RateInfo {
    fn identity(from: &str, to: &str) -> Self {
        Self {
            from: from.to_uppercase(),
            to: to.to_uppercase(),
            rate: 1.0,
            source: "identity".to_string(),
        }
    }

    fn from_entity(entity: &ExchangeRateInfo) -> Self {
        Self {
            from: entity.from_currency().to_string(),
            to: entity.to_currency().to_string(),
            rate: entity.rate(),
            source: entity.source().to_string(),
        }
    }
}

pub struct ExchangeService {
    cache: Arc<RateCache>,
    provider: Arc<dyn ExchangeRateProvider>,
}

impl ExchangeService {
    pub fn new(cache: Arc<RateCache>, provider: Arc<dyn ExchangeRateProvider>) -> Self {
        Self { cache, provider }
    }

    pub fn cache(&self) -> &Arc<RateCache> {
        &self.cache
    }

    /// Cache-first rate lookup. On a cache miss, falls through to the
    /// provider and writes both the direct and inverse entries back
    /// (fire-and-forget: failures are logged, not propagated).
    pub async fn get_rate(&self, from: &str, to: &str) -> Result<RateInfo, RatesError> {
        if from.eq_ignore_ascii_case(to) {
            return Ok(RateInfo::identity(from, to));
        }

        let pair_id = ExchangeRateInfo::pair_id(from, to);
        if let Ok(cached) = self.cache.rates().get(&pair_id) {
            return Ok(RateInfo::from_entity(&cached));
        }

        let rate = self
            .provider
            .fetch_rate(from, to)
            .await
            .map_err(|_| RatesError::RateUnavailable {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        let mut rates = HashMap::new();
        rates.insert(to.to_string(), FetchedRate { rate });
        if let Err(e) = self.cache.cache_rates(from, rates, "provider-fallback").await {
            warn!(error = %e, from, to, "exchange service: failed to backfill cache after provider fallback");
        }

        Ok(RateInfo {
            from: from.to_uppercase(),
            to: to.to_uppercase(),
            rate,
            source: "provider-fallback".to_string(),
        })
    }

    /// Converts `amount` to `to`, returning the converted amount and the
    /// rate used. `amount` must be strictly positive.
    pub async fn convert(&self, amount: Money, to: &str) -> Result<(Money, RateInfo), RatesError> {
        if !amount.is_positive() {
            return Err(RatesError::InvalidAmount);
        }
        let from = amount.currency();
        if from.eq_ignore_ascii_case(to) {
            return Ok((amount, RateInfo::identity(&from, to)));
        }
        let rate_info = self.get_rate(&from, to).await?;
        let converted = amount.convert(rate_info.rate, to)?;
        Ok((converted, rate_info))
    }

    pub async fn is_supported(&self, from: &str, to: &str) -> bool {
        if from.eq_ignore_ascii_case(to) {
            return true;
        }
        self.provider.is_supported(from, to).await
    }

    /// Exposed for the Background Refresher, which fetches the full rate
    /// table for a base currency rather than a single pair.
    pub async fn fetch_rates_from_provider(
        &self,
        base: &str,
    ) -> anyhow::Result<HashMap<String, f64>> {
        self.provider.fetch_rates(base).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::provider::FakeExchangeRateProvider;

    fn service_with_rates(rates: HashMap<String, f64>) -> ExchangeService {
        let cache = Arc::new(RateCache::new(Duration::from_secs(300)));
        let provider = Arc::new(FakeExchangeRateProvider::new("USD", rates));
        ExchangeService::new(cache, provider)
    }

    #[tokio::test]
    async fn identity_rate_for_same_currency() {
        let service = service_with_rates(HashMap::new());
        let rate = service.get_rate("USD", "usd").await.unwrap();
        assert_eq!(rate.rate, 1.0);
    }

    #[tokio::test]
    async fn falls_back_to_provider_on_cache_miss_and_backfills() {
        let mut rates = HashMap::new();
        rates.insert("EUR".to_string(), 0.85);
        let service = service_with_rates(rates);

        let rate = service.get_rate("USD", "EUR").await.unwrap();
        assert!((rate.rate - 0.85).abs() < 1e-9);

        // Second call should be served from cache, not the provider.
        let cached = service.cache.rates().get("USD:EUR").unwrap();
        assert_eq!(cached.source(), "provider-fallback");
    }

    #[tokio::test]
    async fn provider_failure_surfaces_rate_unavailable() {
        let service = service_with_rates(HashMap::new());
        let err = service.get_rate("USD", "XYZ").await.unwrap_err();
        assert!(matches!(err, RatesError::RateUnavailable { .. }));
    }

    #[tokio::test]
    async fn convert_rejects_non_positive_amount() {
        let service = service_with_rates(HashMap::new());
        let zero = Money::new(0, "USD");
        assert!(matches!(
            service.convert(zero, "EUR").await.unwrap_err(),
            RatesError::InvalidAmount
        ));
    }

    #[tokio::test]
    async fn convert_same_currency_is_identity() {
        let service = service_with_rates(HashMap::new());
        let amount = Money::new(10000, "USD");
        let (converted, rate) = service.convert(amount, "USD").await.unwrap();
        assert_eq!(converted, amount);
        assert_eq!(rate.rate, 1.0);
    }

    #[tokio::test]
    async fn convert_uses_fetched_rate() {
        let mut rates = HashMap::new();
        rates.insert("EUR".to_string(), 0.85);
        let service = service_with_rates(rates);
        let amount = Money::new(10000, "USD");
        let (converted, _) = service.convert(amount, "EUR").await.unwrap();
        assert_eq!(converted.amount_minor(), 8500);
    }
}
