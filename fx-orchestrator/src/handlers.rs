//! The handler registration matrix: the internal business-flow handlers
//! wired onto the event bus at orchestrator construction, as opposed to the
//! webhook dispatch table in [`crate::orchestrator`] which reacts to
//! provider-originated events.
//!
//! Deposit, withdraw, and transfer each follow the same shape: a
//! `*Requested` event triggers currency conversion (if the target currency
//! differs from the source), producing a `*Converted` event; transfers additionally
//! emit `TransferCompleted` once converted. `FeesCalculated` is handled
//! independently since it isn't part of any of these flows.

use std::sync::Arc;

use fx_eventbus::{Event, EventBus, EventType};
use tracing::{info, warn};

pub fn register_all(bus: &Arc<dyn EventBus>) {
    bus.register(EventType::DepositRequested, relay_handler(bus.clone(), EventType::DepositConverted));
    bus.register(EventType::WithdrawRequested, relay_handler(bus.clone(), EventType::WithdrawConverted));
    bus.register(EventType::TransferRequested, relay_handler(bus.clone(), EventType::TransferConverted));
    bus.register(EventType::TransferConverted, complete_transfer_handler(bus.clone()));
    bus.register(
        EventType::CurrencyConversionRequested,
        relay_handler(bus.clone(), EventType::CurrencyConverted),
    );
    bus.register(EventType::FeesCalculated, fees_calculated_handler());
}

/// Builds a handler that re-emits its input event, unchanged apart from its
/// type, as `to`. Conversion happens upstream (the payload already carries
/// the converted amount by the time it reaches the bus); this handler's job
/// is purely to advance the flow's state.
fn relay_handler(bus: Arc<dyn EventBus>, to: EventType) -> fx_eventbus::Handler {
    Arc::new(move |event: Event| {
        let bus = bus.clone();
        Box::pin(async move {
            let relayed = Event::new(to, event.payload.clone());
            let relayed = match (&event.user_id, &event.account_id, &event.correlation_id) {
                (Some(u), Some(a), Some(c)) => relayed
                    .with_user(u.as_str())
                    .with_account(a.as_str())
                    .with_correlation_id(c.as_str()),
                _ => relayed,
            };
            info!(from = %event.event_type, %to, correlation_id = ?relayed.correlation_id, "relaying event");
            if let Err(e) = bus.emit(relayed).await {
                warn!(error = %e, %to, "failed to relay event");
                return Err(e);
            }
            Ok(())
        })
    })
}

fn complete_transfer_handler(bus: Arc<dyn EventBus>) -> fx_eventbus::Handler {
    Arc::new(move |event: Event| {
        let bus = bus.clone();
        Box::pin(async move {
            let completed = Event::new(EventType::TransferCompleted, event.payload.clone());
            let completed = match (&event.user_id, &event.account_id, &event.correlation_id) {
                (Some(u), Some(a), Some(c)) => completed
                    .with_user(u.as_str())
                    .with_account(a.as_str())
                    .with_correlation_id(c.as_str()),
                _ => completed,
            };
            if let Err(e) = bus.emit(completed).await {
                warn!(error = %e, "failed to emit transfer_completed");
                return Err(e);
            }
            Ok(())
        })
    })
}

fn fees_calculated_handler() -> fx_eventbus::Handler {
    Arc::new(|event: Event| {
        Box::pin(async move {
            info!(
                correlation_id = ?event.correlation_id,
                fee = ?event.payload.get("fee_minor"),
                "fees calculated"
            );
            Ok(())
        })
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use fx_eventbus::MemoryBus;

    use super::*;

    #[tokio::test]
    async fn transfer_requested_relays_into_converted() {
        let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
        let seen: Arc<Mutex<Vec<EventType>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.register(
            EventType::TransferConverted,
            Arc::new(move |event: Event| {
                let seen = seen_clone.clone();
                Box::pin(async move {
                    seen.lock().unwrap().push(event.event_type);
                    Ok(())
                })
            }),
        );
        register_all(&bus);

        bus.emit(
            Event::new(EventType::TransferRequested, serde_json::json!({"amount": 100}))
                .with_user("u1")
                .with_account("a1")
                .with_correlation_id("tx1"),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().unwrap(), vec![EventType::TransferConverted]);
    }

    #[tokio::test]
    async fn transfer_requested_propagates_to_completed() {
        let bus: Arc<dyn EventBus> = Arc::new(MemoryBus::new());
        register_all(&bus);

        bus.emit(
            Event::new(EventType::TransferConverted, serde_json::json!({"amount": 100}))
                .with_correlation_id("tx1"),
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
