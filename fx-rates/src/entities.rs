//! The two entity kinds stored in the rate cache's [`fx_registry::Registry`]:
//! [`ExchangeRateInfo`] pairs and the single [`LastUpdatedSentinel`].

use fx_common::{AsEntity, Entity, TimestampMs};
use serde::{Deserialize, Serialize};

/// A single directional exchange rate, e.g. `"USD:EUR" -> 0.85`.
///
/// Stored under id `"<from>:<to>"`. Every `cache_rates` call that writes a
/// direct pair also writes its inverse (`"<to>:<from>"`, rate `1/rate`),
/// unless the direct rate is too close to zero to invert safely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRateInfo {
    entity: Entity,
}

impl ExchangeRateInfo {
    pub fn new(from: &str, to: &str, rate: f64, source: impl Into<String>) -> Self {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        let id = format!("{from}:{to}");
        let mut entity = Entity::new(id, format!("{from} to {to}"))
            .expect("uppercased currency codes are never empty");
        entity.set_metadata("from", from);
        entity.set_metadata("to", to);
        entity.set_metadata("rate", rate.to_string());
        entity.set_metadata("source", source.into());
        entity.set_metadata("timestamp", TimestampMs::now().to_rfc3339_nanos());
        Self { entity }
    }

    pub fn from_currency(&self) -> &str {
        self.entity.get_metadata("from").unwrap_or_default()
    }

    pub fn to_currency(&self) -> &str {
        self.entity.get_metadata("to").unwrap_or_default()
    }

    pub fn rate(&self) -> f64 {
        self.entity
            .get_metadata("rate")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0)
    }

    pub fn source(&self) -> &str {
        self.entity.get_metadata("source").unwrap_or_default()
    }

    pub fn timestamp(&self) -> Option<TimestampMs> {
        self.entity
            .get_metadata("timestamp")
            .and_then(TimestampMs::from_rfc3339_nanos)
    }

    pub fn pair_id(from: &str, to: &str) -> String {
        format!("{}:{}", from.to_uppercase(), to.to_uppercase())
    }
}

impl AsEntity for ExchangeRateInfo {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

/// The single source of truth for "when was the cache last refreshed
/// globally". Fixed id `"exr:rate:last_updated"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastUpdatedSentinel {
    entity: Entity,
}

impl LastUpdatedSentinel {
    pub const ID: &'static str = "exr:rate:last_updated";

    pub fn now() -> Self {
        let mut entity = Entity::new(Self::ID, "exchange rate cache last-updated sentinel")
            .expect("constant id/name are never empty");
        entity.set_metadata("timestamp", TimestampMs::now().to_rfc3339_nanos());
        Self { entity }
    }

    /// Falls back to `updated_at` when the `timestamp` metadata is missing.
    pub fn timestamp(&self) -> TimestampMs {
        self.entity
            .get_metadata("timestamp")
            .and_then(TimestampMs::from_rfc3339_nanos)
            .unwrap_or_else(|| self.entity.updated_at())
    }
}

impl AsEntity for LastUpdatedSentinel {
    fn entity(&self) -> &Entity {
        &self.entity
    }

    fn entity_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_id_is_upper_cased() {
        assert_eq!(ExchangeRateInfo::pair_id("usd", "eur"), "USD:EUR");
    }

    #[test]
    fn rate_info_roundtrips_metadata() {
        let info = ExchangeRateInfo::new("usd", "eur", 0.85, "test-provider");
        assert_eq!(info.id(), "USD:EUR");
        assert_eq!(info.from_currency(), "USD");
        assert_eq!(info.to_currency(), "EUR");
        assert_eq!(info.rate(), 0.85);
        assert_eq!(info.source(), "test-provider");
        assert!(info.timestamp().is_some());
    }

    #[test]
    fn sentinel_falls_back_to_updated_at_when_metadata_missing() {
        let mut sentinel = LastUpdatedSentinel::now();
        sentinel.entity.delete_metadata("timestamp");
        assert_eq!(sentinel.timestamp(), sentinel.entity.updated_at());
    }
}
