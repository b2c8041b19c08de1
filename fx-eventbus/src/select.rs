//! Driver selection: turns [`fx_common::config::Config`]'s event-bus
//! settings into a concrete [`EventBus`], applying the documented fallback
//! rules rather than failing process startup.

use std::sync::Arc;

use fx_common::config::{Config, EventBusDriver};
use tracing::warn;

use crate::{bus::EventBus, kafka_bus::KafkaBus, memory::MemoryBus, redis_bus::RedisBus};

/// Builds the configured event bus, falling back to the in-memory driver
/// whenever a remote backend is selected but unreachable or unconfigured.
pub async fn build_bus(config: &Config) -> Arc<dyn EventBus> {
    match config.eventbus_driver {
        EventBusDriver::Memory => Arc::new(MemoryBus::new()),

        EventBusDriver::Redis => match &config.eventbus_redis_url {
            Some(url) if !url.is_empty() => {
                match RedisBus::connect(
                    url,
                    config.eventbus_topic_prefix.clone(),
                    config.eventbus_consumer_group.clone(),
                    config.eventbus_dlq_retry_interval,
                    config.eventbus_dlq_batch_size,
                )
                .await
                {
                    Ok(bus) => Arc::new(bus),
                    Err(e) => {
                        warn!(error = %e, "event bus: redis unreachable, falling back to memory driver");
                        Arc::new(MemoryBus::new())
                    }
                }
            }
            _ => {
                warn!("event bus: redis driver selected with no url configured, falling back to memory driver");
                Arc::new(MemoryBus::new())
            }
        },

        EventBusDriver::Kafka => match &config.eventbus_kafka_brokers {
            Some(brokers) if !brokers.is_empty() => {
                match KafkaBus::connect(
                    brokers,
                    config.eventbus_topic_prefix.clone(),
                    config.eventbus_consumer_group.clone(),
                    config.eventbus_dlq_retry_interval,
                    config.eventbus_dlq_batch_size,
                )
                .await
                {
                    Ok(bus) => Arc::new(bus),
                    Err(e) => {
                        warn!(error = %e, "event bus: kafka unreachable, falling back to memory driver");
                        Arc::new(MemoryBus::new())
                    }
                }
            }
            _ => {
                warn!("event bus: kafka driver selected with no brokers configured, falling back to memory driver");
                Arc::new(MemoryBus::new())
            }
        },
    }
}
