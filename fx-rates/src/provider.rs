//! The [`ExchangeRateProvider`] boundary: whatever upstream service the
//! Exchange Service and Background Refresher fetch rates from.

use std::collections::HashMap;

use async_trait::async_trait;

#[async_trait]
pub trait ExchangeRateProvider: Send + Sync {
    /// Fetches a single direct rate, units of `to` per unit of `from`.
    async fn fetch_rate(&self, from: &str, to: &str) -> anyhow::Result<f64>;

    /// Fetches rates for every currency this provider covers, relative to
    /// `base`. Used by the Background Refresher.
    async fn fetch_rates(&self, base: &str) -> anyhow::Result<HashMap<String, f64>>;

    /// Whether this provider can answer for the given currency pair.
    async fn is_supported(&self, from: &str, to: &str) -> bool;
}

/// An in-memory [`ExchangeRateProvider`] fake for tests, seeded with a fixed
/// table of rates relative to a chosen base currency.
#[cfg(any(test, feature = "test-util"))]
pub struct FakeExchangeRateProvider {
    base: String,
    rates: std::sync::Mutex<HashMap<String, f64>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-util"))]
impl FakeExchangeRateProvider {
    pub fn new(base: impl Into<String>, rates: HashMap<String, f64>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            rates: std::sync::Mutex::new(rates),
            fail: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl ExchangeRateProvider for FakeExchangeRateProvider {
    async fn fetch_rate(&self, from: &str, to: &str) -> anyhow::Result<f64> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("fake provider configured to fail");
        }
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        let rates = self.rates.lock().unwrap();
        if from == self.base {
            return rates
                .get(&to)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("no rate for {from}/{to}"));
        }
        if to == self.base {
            let rate = rates
                .get(&from)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("no rate for {from}/{to}"))?;
            return Ok(1.0 / rate);
        }
        anyhow::bail!("fake provider only supports pairs through {}", self.base)
    }

    async fn fetch_rates(&self, base: &str) -> anyhow::Result<HashMap<String, f64>> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("fake provider configured to fail");
        }
        if base.to_uppercase() != self.base {
            anyhow::bail!("fake provider only serves base {}", self.base);
        }
        Ok(self.rates.lock().unwrap().clone())
    }

    async fn is_supported(&self, from: &str, to: &str) -> bool {
        let (from, to) = (from.to_uppercase(), to.to_uppercase());
        from == self.base || to == self.base
    }
}
