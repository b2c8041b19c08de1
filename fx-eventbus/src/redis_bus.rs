//! The Redis Streams bus: one stream per event type under a configurable
//! topic prefix, consumer-group reads, and a DLQ-retry loop.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use fx_tokio::{shutdown::ShutdownChannel, task::LxTask};
use redis::{
    streams::{StreamReadOptions, StreamReadReply},
    AsyncCommands,
};
use tracing::{debug, error, warn};

use crate::{
    bus::{EventBus, Handler},
    event::{Event, EventType},
};

/// Field name carrying the JSON-encoded [`Event`] in a stream entry.
const FIELD_EVENT: &str = "event";
/// Field name carrying the retry counter once an entry lands in the DLQ.
const FIELD_RETRIES: &str = "retries";
/// Entries are parked for good once they've failed this many redeliveries.
const MAX_RETRIES: u32 = 5;

/// Reads the `retries` field off a stream entry, defaulting to 0 for
/// entries that have never been through the DLQ (primary-stream entries
/// from `emit` carry no such field).
fn read_retries(map: &HashMap<String, redis::Value>) -> u32 {
    map.get(FIELD_RETRIES)
        .and_then(|v| match v {
            redis::Value::BulkString(b) => std::str::from_utf8(b).ok()?.parse().ok(),
            _ => None,
        })
        .unwrap_or(0u32)
}

struct Inner {
    client: redis::Client,
    topic_prefix: String,
    consumer_group: String,
    dlq_retry_interval: Duration,
    dlq_batch_size: usize,
    handlers: RwLock<HashMap<EventType, Vec<Handler>>>,
    reading: RwLock<HashSet<EventType>>,
    shutdown: ShutdownChannel,
}

impl Inner {
    fn stream_name(&self, event_type: EventType) -> String {
        format!("{}{}", self.topic_prefix, event_type)
    }

    fn dlq_name(&self, event_type: EventType) -> String {
        format!("{}{}:dlq", self.topic_prefix, event_type)
    }

    async fn connection(&self) -> anyhow::Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
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

    /// `retries` is the number of redeliveries this entry has already gone
    /// through -- carried forward from the primary-stream entry it came
    /// from, not reset to zero, so the DLQ retry loop's `MAX_RETRIES` check
    /// eventually parks entries that keep failing instead of looping them
    /// between primary and DLQ forever.
    async fn route_to_dlq(&self, event_type: EventType, event: &Event, retries: u32) -> anyhow::Result<()> {
        let dlq = self.dlq_name(event_type);
        let mut conn = self.connection().await?;
        let json = serde_json::to_vec(event)?;
        let _: String = conn
            .xadd(
                &dlq,
                "*",
                &[
                    (FIELD_EVENT, json.as_slice()),
                    (FIELD_RETRIES, retries.to_string().as_bytes()),
                ],
            )
            .await?;
        Ok(())
    }
}

/// A handle to the Redis-backed [`EventBus`]. Cheap to clone; every clone
/// shares the same reader/DLQ tasks and handler map.
#[derive(Clone)]
pub struct RedisBus {
    inner: Arc<Inner>,
    workers: Arc<std::sync::Mutex<Vec<LxTask<()>>>>,
}

impl RedisBus {
    /// Connects and validates the Redis URL. Callers should fall back to
    /// [`crate::memory::MemoryBus`] if this returns an error, per the driver
    /// selection rules.
    pub async fn connect(
        url: &str,
        topic_prefix: impl Into<String>,
        consumer_group: impl Into<String>,
        dlq_retry_interval: Duration,
        dlq_batch_size: usize,
    ) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        // Fail fast on an unreachable Redis rather than lazily on first use.
        let mut conn = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        let inner = Arc::new(Inner {
            client,
            topic_prefix: topic_prefix.into(),
            consumer_group: consumer_group.into(),
            dlq_retry_interval,
            dlq_batch_size,
            handlers: RwLock::new(HashMap::new()),
            reading: RwLock::new(HashSet::new()),
            shutdown: ShutdownChannel::new(),
        });
        let bus = Self {
            inner,
            workers: Arc::new(std::sync::Mutex::new(Vec::new())),
        };
        let dlq_task = spawn_dlq_retry_loop(bus.inner.clone());
        bus.workers.lock().unwrap().push(dlq_task);
        Ok(bus)
    }

    /// Signals all reader and DLQ-retry tasks to stop. Tasks honour this
    /// cooperatively at their next loop iteration.
    pub fn shutdown(&self) {
        self.inner.shutdown.send();
    }
}

fn spawn_reader(inner: Arc<Inner>, event_type: EventType) -> LxTask<()> {
    LxTask::spawn(format!("redis-bus-reader-{event_type}"), async move {
        let stream = inner.stream_name(event_type);
        let dlq = inner.dlq_name(event_type);
        let Ok(mut conn) = inner.connection().await else {
            error!(%stream, "redis bus: reader could not connect");
            return;
        };
        let _: Result<(), _> = conn
            .xgroup_create_mkstream(&stream, &inner.consumer_group, "0")
            .await;

        loop {
            if inner.shutdown.try_recv() {
                return;
            }
            let opts = StreamReadOptions::default()
                .group(&inner.consumer_group, "fx-node")
                .count(10)
                .block(1_000);
            let read: Result<StreamReadReply, _> =
                conn.xread_options(&[&stream], &[">"], &opts).await;

            let reply = match read {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, %stream, "redis bus: stream read failed");
                    continue;
                }
            };

            for stream_key in reply.keys {
                for stream_id in stream_key.ids {
                    let Some(redis::Value::BulkString(bytes)) = stream_id.map.get(FIELD_EVENT) else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_slice::<Event>(bytes) else {
                        warn!(%stream, id = %stream_id.id, "redis bus: undecodable entry, acking and dropping");
                        let _: Result<i32, _> =
                            conn.xack(&stream, &inner.consumer_group, &[&stream_id.id]).await;
                        continue;
                    };

                    debug!(%stream, id = %stream_id.id, "redis bus: dispatching entry");
                    match inner.dispatch(event_type, &event).await {
                        Ok(()) => {
                            let _: Result<i32, _> =
                                conn.xack(&stream, &inner.consumer_group, &[&stream_id.id]).await;
                        }
                        Err(e) => {
                            let retries = read_retries(&stream_id.map);
                            warn!(error = %e, %stream, id = %stream_id.id, %dlq, retries, "redis bus: handler failed, routing to dlq");
                            if let Err(e) = inner.route_to_dlq(event_type, &event, retries).await {
                                error!(error = %e, %dlq, "redis bus: failed to enqueue dlq entry");
                            }
                            let _: Result<i32, _> =
                                conn.xack(&stream, &inner.consumer_group, &[&stream_id.id]).await;
                        }
                    }
                }
            }
        }
    })
}

fn spawn_dlq_retry_loop(inner: Arc<Inner>) -> LxTask<()> {
    LxTask::spawn("redis-bus-dlq-retry", async move {
        let mut ticker = tokio::time::interval(inner.dlq_retry_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = drain_dlqs(&inner).await {
                        warn!(error = %e, "redis bus: dlq retry cycle failed");
                    }
                }
                () = inner.shutdown.recv() => return,
            }
        }
    })
}

async fn drain_dlqs(inner: &Inner) -> anyhow::Result<()> {
    let mut conn = inner.connection().await?;
    let pattern = format!("{}*:dlq", inner.topic_prefix);
    let dlq_keys: Vec<String> = conn.keys(&pattern).await?;

    for dlq_key in dlq_keys {
        let primary = dlq_key.trim_end_matches(":dlq").to_string();
        let entries: StreamReadReply = conn
            .xread_options(
                &[&dlq_key],
                &["0"],
                &StreamReadOptions::default().count(inner.dlq_batch_size),
            )
            .await?;

        for stream_key in entries.keys {
            for stream_id in stream_key.ids {
                let retries = read_retries(&stream_id.map);

                if retries >= MAX_RETRIES {
                    warn!(%dlq_key, id = %stream_id.id, retries, "redis bus: entry exceeded max retries, parking permanently");
                    continue;
                }

                if let Some(redis::Value::BulkString(event_bytes)) = stream_id.map.get(FIELD_EVENT) {
                    let _: String = conn
                        .xadd(
                            &primary,
                            "*",
                            &[
                                (FIELD_EVENT, event_bytes.as_slice()),
                                (FIELD_RETRIES, (retries + 1).to_string().as_bytes()),
                            ],
                        )
                        .await?;
                }
                let _: i32 = conn.xdel(&dlq_key, &[&stream_id.id]).await?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl EventBus for RedisBus {
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
            self.workers.lock().unwrap().push(reader);
        }
    }

    async fn emit(&self, event: Event) -> anyhow::Result<()> {
        let stream = self.inner.stream_name(event.event_type);
        let mut conn = self.inner.connection().await?;
        let json = serde_json::to_vec(&event)?;
        let _: String = conn.xadd(&stream, "*", &[(FIELD_EVENT, json.as_slice())]).await?;
        Ok(())
    }
}
