//! The Kafka bus: one topic per event type under the configured prefix, a
//! consumer group per process, and a `.dlq` topic retry loop. Semantics
//! mirror [`crate::redis_bus::RedisBus`].

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use fx_tokio::{shutdown::ShutdownChannel, task::LxTask};
use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    message::{Headers, Message, OwnedHeaders},
    producer::{FutureProducer, FutureRecord},
    ClientConfig,
};
use tracing::{error, warn};

use crate::{
    bus::{EventBus, Handler},
    event::{Event, EventType},
};

const HEADER_RETRIES: &str = "retries";
const MAX_RETRIES: u32 = 5;
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads the `retries` header off a consumed message, defaulting to 0 for
/// messages that have never been through the DLQ.
fn message_retries<M: Message>(message: &M) -> u32 {
    message
        .headers()
        .and_then(|headers| {
            headers.iter().find(|h| h.key == HEADER_RETRIES).and_then(|h| {
                h.value.and_then(|v| std::str::from_utf8(v).ok()?.parse().ok())
            })
        })
        .unwrap_or(0u32)
}

struct Inner {
    brokers: String,
    topic_prefix: String,
    consumer_group: String,
    producer: FutureProducer,
    dlq_retry_interval: Duration,
    dlq_batch_size: usize,
    handlers: RwLock<HashMap<EventType, Vec<Handler>>>,
    reading: RwLock<HashSet<EventType>>,
    shutdown: ShutdownChannel,
}

impl Inner {
    fn topic(&self, event_type: EventType) -> String {
        format!("{}{}", self.topic_prefix, event_type)
    }

    fn dlq_topic(&self, event_type: EventType) -> String {
        format!("{}{}.dlq", self.topic_prefix, event_type)
    }

    fn consumer_for(&self, group_suffix: &str) -> anyhow::Result<StreamConsumer> {
        Ok(ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", format!("{}-{}", self.consumer_group, group_suffix))
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .create()?)
    }

    async fn dispatch(&self, event_type: EventType, event: &Event) -> anyhow::Result<()> {
        let handlers = self
            .handlers
            .read()
            .unwrap()
            .get(&event_type)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            handler(event.clone()).await?;
        }
        Ok(())
    }

    async fn produce(&self, topic: &str, payload: &[u8], retries: u32) -> anyhow::Result<()> {
        let headers = OwnedHeaders::new().insert(rdkafka::message::Header {
            key: HEADER_RETRIES,
            value: Some(retries.to_string().as_bytes()),
        });
        let record = FutureRecord::to(topic).payload(payload).key("").headers(headers);
        self.producer
            .send(record, SEND_TIMEOUT)
            .await
            .map_err(|(e, _)| anyhow::anyhow!("kafka produce failed: {e}"))?;
        Ok(())
    }
}

/// A handle to the Kafka-backed [`EventBus`]. Cheap to clone.
#[derive(Clone)]
pub struct KafkaBus {
    inner: Arc<Inner>,
    workers: Arc<std::sync::Mutex<Vec<LxTask<()>>>>,
}

impl KafkaBus {
    /// Builds the producer and validates connectivity. Callers should fall
    /// back to [`crate::memory::MemoryBus`] on error, per the driver
    /// selection rules.
    pub async fn connect(
        brokers: &str,
        topic_prefix: impl Into<String>,
        consumer_group: impl Into<String>,
        dlq_retry_interval: Duration,
        dlq_batch_size: usize,
    ) -> anyhow::Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        // Validate connectivity up front rather than discovering it lazily.
        producer.client().fetch_metadata(None, Duration::from_secs(5))?;

        let inner = Arc::new(Inner {
            brokers: brokers.to_string(),
            topic_prefix: topic_prefix.into(),
            consumer_group: consumer_group.into(),
            producer,
            dlq_retry_interval,
            dlq_batch_size,
            handlers: RwLock::new(HashMap::new()),
            reading: RwLock::new(HashSet::new()),
            shutdown: ShutdownChannel::new(),
        });
        Ok(Self {
            inner,
            workers: Arc::new(std::sync::Mutex::new(Vec::new())),
        })
    }

    pub fn shutdown(&self) {
        self.inner.shutdown.send();
    }
}

fn spawn_reader(inner: Arc<Inner>, event_type: EventType) -> LxTask<()> {
    LxTask::spawn(format!("kafka-bus-reader-{event_type}"), async move {
        let topic = inner.topic(event_type);
        let dlq_topic = inner.dlq_topic(event_type);
        let Ok(consumer) = inner.consumer_for(&topic) else {
            error!(%topic, "kafka bus: reader could not build consumer");
            return;
        };
        if let Err(e) = consumer.subscribe(&[topic.as_str()]) {
            error!(error = %e, %topic, "kafka bus: subscribe failed");
            return;
        }

        loop {
            tokio::select! {
                recv = consumer.recv() => {
                    let message = match recv {
                        Ok(m) => m,
                        Err(e) => {
                            warn!(error = %e, %topic, "kafka bus: consumer recv failed");
                            continue;
                        }
                    };
                    let Some(payload) = message.payload() else { continue };
                    let Ok(event) = serde_json::from_slice::<Event>(payload) else {
                        warn!(%topic, "kafka bus: undecodable message, dropping");
                        continue;
                    };

                    if let Err(e) = inner.dispatch(event_type, &event).await {
                        let retries = message_retries(&message);
                        warn!(error = %e, %topic, %dlq_topic, retries, "kafka bus: handler failed, routing to dlq");
                        if let Err(e) = inner.produce(&dlq_topic, payload, retries).await {
                            error!(error = %e, %dlq_topic, "kafka bus: failed to enqueue dlq entry");
                        }
                    }
                }
                () = inner.shutdown.recv() => return,
            }
        }
    })
}

fn spawn_dlq_retry_loop(inner: Arc<Inner>, event_type: EventType) -> LxTask<()> {
    LxTask::spawn(format!("kafka-bus-dlq-retry-{event_type}"), async move {
        let topic = inner.topic(event_type);
        let dlq_topic = inner.dlq_topic(event_type);
        let Ok(consumer) = inner.consumer_for(&format!("{dlq_topic}-retry")) else {
            error!(%dlq_topic, "kafka bus: dlq retry loop could not build consumer");
            return;
        };
        if let Err(e) = consumer.subscribe(&[dlq_topic.as_str()]) {
            error!(error = %e, %dlq_topic, "kafka bus: dlq subscribe failed");
            return;
        }

        let mut ticker = tokio::time::interval(inner.dlq_retry_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for _ in 0..inner.dlq_batch_size {
                        let Ok(message) = tokio::time::timeout(Duration::from_millis(200), consumer.recv()).await else {
                            break;
                        };
                        let Ok(message) = message else { break };
                        let retries = message_retries(&message);

                        if retries >= MAX_RETRIES {
                            warn!(%dlq_topic, retries, "kafka bus: entry exceeded max retries, parking permanently");
                            continue;
                        }
                        if let Some(payload) = message.payload() {
                            if let Err(e) = inner.produce(&topic, payload, retries + 1).await {
                                error!(error = %e, %topic, "kafka bus: dlq re-submit failed");
                            }
                        }
                    }
                }
                () = inner.shutdown.recv() => return,
            }
        }
    })
}

#[async_trait]
impl EventBus for KafkaBus {
    fn register(&self, event_type: EventType, handler: Handler) {
        self.inner
            .handlers
            .write()
            .unwrap()
            .entry(event_type)
            .or_default()
            .push(handler);

        let already_reading = self.inner.reading.read().unwrap().contains(&event_type);
        if !already_reading {
            self.inner.reading.write().unwrap().insert(event_type);
            let reader = spawn_reader(self.inner.clone(), event_type);
            let dlq_retry = spawn_dlq_retry_loop(self.inner.clone(), event_type);
            let mut workers = self.workers.lock().unwrap();
            workers.push(reader);
            workers.push(dlq_retry);
        }
    }

    async fn emit(&self, event: Event) -> anyhow::Result<()> {
        let topic = self.inner.topic(event.event_type);
        let json = serde_json::to_vec(&event)?;
        self.inner.produce(&topic, &json, 0).await
    }
}
