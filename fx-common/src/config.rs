//! Environment-driven configuration, read once at process start.
//!
//! Following `common/src/env.rs`'s style in the teacher workspace: plain
//! `std::env::var` lookups with typed defaults, never a panic -- an absent
//! or malformed var just falls back, since none of these settings are
//! required for the library crates to function (only `fx-node` reads this).

use std::time::Duration;

/// The selected event bus backend. See [`crate::config::Config::eventbus_driver`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EventBusDriver {
    Memory,
    Redis,
    Kafka,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_url: Option<String>,
    pub redis_url: Option<String>,

    pub eventbus_driver: EventBusDriver,
    pub eventbus_redis_url: Option<String>,
    pub eventbus_kafka_brokers: Option<String>,
    pub eventbus_topic_prefix: String,
    pub eventbus_consumer_group: String,
    pub eventbus_dlq_retry_interval: Duration,
    pub eventbus_dlq_batch_size: usize,

    pub exr_cache_url: Option<String>,
    pub exr_cache_ttl: Duration,
    pub exr_cache_prefix: String,

    pub stripe_api_key: Option<String>,
    pub stripe_signing_secret: Option<String>,
    pub stripe_success_path: String,
    pub stripe_cancel_path: String,
    pub stripe_onboarding_refresh_url: Option<String>,
    pub stripe_onboarding_return_url: Option<String>,
}

impl Config {
    /// Reads configuration from environment variables, falling back to
    /// defaults for anything absent or malformed.
    pub fn from_env() -> Self {
        Self {
            db_url: env_opt("DB_URL"),
            redis_url: env_opt("REDIS_URL"),

            eventbus_driver: env_driver("EVENTBUS_DRIVER"),
            eventbus_redis_url: env_opt("EVENTBUS_REDIS_URL"),
            eventbus_kafka_brokers: env_opt("EVENTBUS_KAFKA_BROKERS"),
            eventbus_topic_prefix: env_or("EVENTBUS_TOPIC_PREFIX", "events"),
            eventbus_consumer_group: env_or("EVENTBUS_CONSUMER_GROUP", "core"),
            eventbus_dlq_retry_interval: env_duration_secs(
                "EVENTBUS_DLQ_RETRY_INTERVAL_SECS",
                300,
            ),
            eventbus_dlq_batch_size: env_usize("EVENTBUS_DLQ_BATCH_SIZE", 10),

            exr_cache_url: env_opt("EXR_CACHE_URL"),
            exr_cache_ttl: env_duration_secs("EXR_CACHE_TTL", 5 * 60),
            exr_cache_prefix: env_or("EXR_CACHE_PREFIX", "exr:rate:"),

            stripe_api_key: env_opt("STRIPE_API_KEY"),
            stripe_signing_secret: env_opt("STRIPE_SIGNING_SECRET"),
            stripe_success_path: env_or("STRIPE_SUCCESS_PATH", "/checkout/success"),
            stripe_cancel_path: env_or("STRIPE_CANCEL_PATH", "/checkout/cancel"),
            stripe_onboarding_refresh_url: env_opt("STRIPE_ONBOARDING_REFRESH_URL"),
            stripe_onboarding_return_url: env_opt("STRIPE_ONBOARDING_RETURN_URL"),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_usize(key: &str, default: usize) -> usize {
    env_opt(key)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_opt(key).and_then(|s| s.parse().ok()).unwrap_or(default_secs))
}

fn env_driver(key: &str) -> EventBusDriver {
    match env_opt(key).as_deref() {
        Some("redis") => EventBusDriver::Redis,
        Some("kafka") => EventBusDriver::Kafka,
        // Empty or unknown: in-memory async, per the bus selection rules.
        _ => EventBusDriver::Memory,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // SAFETY: best-effort test; doesn't assume exclusive env access.
        let cfg = Config {
            db_url: None,
            redis_url: None,
            eventbus_driver: env_driver("FX_TEST_NONEXISTENT_DRIVER_VAR"),
            eventbus_redis_url: None,
            eventbus_kafka_brokers: None,
            eventbus_topic_prefix: env_or("FX_TEST_NONEXISTENT_PREFIX", "events"),
            eventbus_consumer_group: "core".to_string(),
            eventbus_dlq_retry_interval: env_duration_secs(
                "FX_TEST_NONEXISTENT_INTERVAL",
                300,
            ),
            eventbus_dlq_batch_size: env_usize("FX_TEST_NONEXISTENT_BATCH", 10),
            exr_cache_url: None,
            exr_cache_ttl: Duration::from_secs(300),
            exr_cache_prefix: "exr:rate:".to_string(),
            stripe_api_key: None,
            stripe_signing_secret: None,
            stripe_success_path: "/checkout/success".to_string(),
            stripe_cancel_path: "/checkout/cancel".to_string(),
            stripe_onboarding_refresh_url: None,
            stripe_onboarding_return_url: None,
        };
        assert_eq!(cfg.eventbus_driver, EventBusDriver::Memory);
        assert_eq!(cfg.eventbus_dlq_retry_interval, Duration::from_secs(300));
        assert_eq!(cfg.eventbus_dlq_batch_size, 10);
    }
}
