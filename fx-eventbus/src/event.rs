//! The event envelope and type tag published on the bus.

use fx_common::TimestampMs;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// The `type` discriminant used both as the wire tag and as the key handlers
/// register against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PaymentInitiated,
    PaymentProcessed,
    PaymentCompleted,
    PaymentFailed,
    /// Resolves the open question on partially-reversed transfers: emitted
    /// alongside a negative-amount `PaymentCompleted`, never in its place,
    /// so downstream handlers can choose which signal they care about.
    PartialReversal,
    FeesCalculated,
    TransferRequested,
    TransferConverted,
    TransferCompleted,
    DepositRequested,
    DepositConverted,
    WithdrawRequested,
    WithdrawConverted,
    CurrencyConversionRequested,
    CurrencyConverted,
    UserOnboardingCompleted,
}

/// A published domain event. `payload` carries the variant-specific fields
/// as a JSON value, matching the wire contract in the component design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub user_id: Option<String>,
    pub account_id: Option<String>,
    pub correlation_id: Option<String>,
    pub timestamp: TimestampMs,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            user_id: None,
            account_id: None,
            correlation_id: None,
            timestamp: TimestampMs::now(),
            payload,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_roundtrip_preserves_type_tag() {
        let event = Event::new(EventType::PaymentCompleted, serde_json::json!({"amount": 100}))
            .with_user("u1")
            .with_correlation_id("corr-1");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"payment_completed\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, EventType::PaymentCompleted);
        assert_eq!(back.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn event_type_display_is_snake_case() {
        assert_eq!(EventType::UserOnboardingCompleted.to_string(), "user_onboarding_completed");
    }
}
