//! The in-memory async bus: one worker task per registered handler, so
//! per-handler-per-type delivery is FIFO relative to a single emitter while
//! distinct handlers run concurrently.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use fx_tokio::task::LxTask;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    bus::{EventBus, Handler},
    event::{Event, EventType},
};

/// The handler map is copy-on-write in spirit: `register` takes a write
/// lock only to push a new sender, `emit` takes a read lock only to clone
/// the sender list, and the worker tasks themselves hold no lock at all.
pub struct MemoryBus {
    handlers: RwLock<HashMap<EventType, Vec<mpsc::UnboundedSender<Event>>>>,
    // Keeps worker tasks alive for the bus's lifetime; dropping the bus
    // drops every sender, which ends each worker's `recv` loop naturally.
    _workers: std::sync::Mutex<Vec<LxTask<()>>>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            _workers: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn spawn_worker(
        event_type: EventType,
        handler: Handler,
        mut rx: mpsc::UnboundedReceiver<Event>,
    ) -> LxTask<()> {
        LxTask::spawn(format!("memory-bus-handler-{event_type}"), async move {
            while let Some(event) = rx.recv().await {
                if let Err(e) = handler(event).await {
                    warn!(error = %e, %event_type, "memory bus: handler failed");
                }
            }
        })
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    fn register(&self, event_type: EventType, handler: Handler) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Self::spawn_worker(event_type, handler, rx);
        self.handlers.write().unwrap().entry(event_type).or_default().push(tx);
        self._workers.lock().unwrap().push(worker);
    }

    async fn emit(&self, event: Event) -> anyhow::Result<()> {
        let senders = self
            .handlers
            .read()
            .unwrap()
            .get(&event.event_type)
            .cloned()
            .unwrap_or_default();
        for tx in &senders {
            // A closed receiver means that handler's worker already exited;
            // not a reason to fail the whole emit.
            let _ = tx.send(event.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[tokio::test]
    async fn all_registered_handlers_run_exactly_once() {
        let bus = MemoryBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = count.clone();
            bus.register(
                EventType::PaymentCompleted,
                Arc::new(move |_event| {
                    let count = count.clone();
                    Box::pin(async move {
                        count.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            );
        }

        bus.emit(Event::new(EventType::PaymentCompleted, serde_json::json!({})))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn handler_panic_does_not_affect_other_handlers() {
        let bus = MemoryBus::new();
        let ran = Arc::new(AtomicUsize::new(0));

        bus.register(
            EventType::PaymentFailed,
            Arc::new(|_event| Box::pin(async move { anyhow::bail!("boom") })),
        );
        let ran_clone = ran.clone();
        bus.register(
            EventType::PaymentFailed,
            Arc::new(move |_event| {
                let ran = ran_clone.clone();
                Box::pin(async move {
                    ran.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        bus.emit(Event::new(EventType::PaymentFailed, serde_json::json!({})))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fifo_per_handler_for_single_emitter() {
        let bus = MemoryBus::new();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_clone = order.clone();
        bus.register(
            EventType::DepositRequested,
            Arc::new(move |event| {
                let order = order_clone.clone();
                Box::pin(async move {
                    let n = event.payload.get("n").and_then(|v| v.as_i64()).unwrap();
                    order.lock().unwrap().push(n);
                    Ok(())
                })
            }),
        );

        for n in 0..5 {
            bus.emit(Event::new(EventType::DepositRequested, serde_json::json!({"n": n})))
                .await
                .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
