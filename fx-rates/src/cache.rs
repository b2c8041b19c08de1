//! [`RateCache`]: a domain overlay on [`fx_registry::Registry`] specialized
//! for bidirectional exchange rates and cache staleness.

use std::{collections::HashMap, time::Duration};

use fx_common::TimestampMs;
use fx_registry::Registry;
use tracing::warn;

use crate::entities::{ExchangeRateInfo, LastUpdatedSentinel};

/// Skip inverting rates this close to zero; `1 / rate` would blow up.
const MIN_INVERTIBLE_RATE: f64 = 1e-10;

/// A rate just fetched from a provider, prior to being written to the cache.
#[derive(Debug, Clone, Copy)]
pub struct FetchedRate {
    pub rate: f64,
}

pub struct RateCache {
    rates: Registry<ExchangeRateInfo>,
    sentinel: Registry<LastUpdatedSentinel>,
    ttl: Duration,
}

impl RateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            rates: Registry::builder("exr_rate").build(),
            sentinel: Registry::builder("exr_sentinel").build(),
            ttl,
        }
    }

    pub fn rates(&self) -> &Registry<ExchangeRateInfo> {
        &self.rates
    }

    /// Reads the `LastUpdatedSentinel`, or [`TimestampMs::ZERO`] if absent.
    pub fn get_last_updated(&self) -> TimestampMs {
        match self.sentinel.get(LastUpdatedSentinel::ID) {
            Ok(sentinel) => sentinel.timestamp(),
            Err(_) => TimestampMs::ZERO,
        }
    }

    /// Returns `(is_stale, time_until_refresh)`. Never errors: a missing
    /// registry entry is treated as stale, not propagated as a not-found.
    pub fn is_cache_stale(&self) -> (bool, Duration) {
        let last_updated = self.get_last_updated();
        if last_updated.is_zero() {
            return (true, Duration::ZERO);
        }
        let age = TimestampMs::now().saturating_duration_since(last_updated);
        if age > self.ttl {
            (true, Duration::ZERO)
        } else {
            (false, self.ttl - age)
        }
    }

    /// Writes `rates` (keyed by destination currency) and their inverses,
    /// then bumps the sentinel. Per-pair registration failures are logged
    /// and skipped; the first error updating the sentinel is returned.
    pub async fn cache_rates(
        &self,
        base: &str,
        rates: HashMap<String, FetchedRate>,
        source: &str,
    ) -> anyhow::Result<()> {
        for (to, fetched) in rates {
            let direct = ExchangeRateInfo::new(base, &to, fetched.rate, source);
            if let Err(e) = self.rates.register(direct).await {
                warn!(error = %e, from = base, to = %to, "rate cache: failed to register direct rate");
                continue;
            }

            if fetched.rate.abs() < MIN_INVERTIBLE_RATE {
                warn!(from = base, to = %to, rate = fetched.rate, "rate cache: skipping inverse, rate too close to zero");
                continue;
            }
            let inverse = ExchangeRateInfo::new(&to, base, 1.0 / fetched.rate, source);
            if let Err(e) = self.rates.register(inverse).await {
                warn!(error = %e, from = %to, to = base, "rate cache: failed to register inverse rate");
            }
        }

        self.sentinel
            .register(LastUpdatedSentinel::now())
            .await
            .map_err(anyhow::Error::from)
    }
}
