//! [`CheckoutSession`]: the orchestrator's own entity kind, persisted in a
//! `Registry` scoped to the `"checkout:"` prefix.

use fx_common::{AsEntity, Entity, Money, TimestampMs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Created,
    Completed,
    Expired,
}

/// Created when a payment is initiated; transitions `created -> completed`
/// on a success webhook or `created -> expired` on a timeout webhook, then
/// is immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    entity: Entity,
}

const EXPIRY: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

impl CheckoutSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        transaction_id: &str,
        user_id: &str,
        account_id: &str,
        amount: Money,
        provider_session_id: &str,
        url: &str,
    ) -> Self {
        let mut entity = Entity::new(provider_session_id, format!("checkout session {transaction_id}"))
            .expect("provider session ids are never empty");
        entity.set_metadata("transaction_id", transaction_id);
        entity.set_metadata("user_id", user_id);
        entity.set_metadata("account_id", account_id);
        entity.set_metadata("amount_minor", amount.amount_minor().to_string());
        entity.set_metadata("currency", amount.currency());
        entity.set_metadata("url", url);
        entity.set_metadata("status", "created");
        let expires_at = TimestampMs::now()
            .checked_add_duration(EXPIRY)
            .unwrap_or(TimestampMs::now());
        entity.set_metadata("expires_at", expires_at.to_rfc3339_nanos());
        Self { entity }
    }

    pub fn transaction_id(&self) -> &str {
        self.entity.get_metadata("transaction_id").unwrap_or_default()
    }

    pub fn amount(&self) -> Money {
        let minor: i64 = self
            .entity
            .get_metadata("amount_minor")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        Money::new(minor, self.entity.get_metadata("currency").unwrap_or("USD"))
    }

    pub fn status(&self) -> CheckoutStatus {
        match self.entity.get_metadata("status") {
            Some("completed") => CheckoutStatus::Completed,
            Some("expired") => CheckoutStatus::Expired,
            _ => CheckoutStatus::Created,
        }
    }

    pub fn mark_completed(&mut self) {
        if self.status() == CheckoutStatus::Created {
            self.entity.set_metadata("status", "completed");
        }
    }

    pub fn mark_expired(&mut self) {
        if self.status() == CheckoutStatus::Created {
            self.entity.set_metadata("status", "expired");
        }
    }
}

impl AsEntity for CheckoutSession {
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
    fn new_session_is_created() {
        let session = CheckoutSession::new(
            "tx1",
            "u1",
            "a1",
            Money::new(10000, "USD"),
            "cs_123",
            "https://pay.example/cs_123",
        );
        assert_eq!(session.status(), CheckoutStatus::Created);
        assert_eq!(session.transaction_id(), "tx1");
        assert_eq!(session.amount().amount_minor(), 10000);
    }

    #[test]
    fn transitions_are_one_way() {
        let mut session = CheckoutSession::new(
            "tx1",
            "u1",
            "a1",
            Money::new(10000, "USD"),
            "cs_123",
            "https://pay.example/cs_123",
        );
        session.mark_completed();
        assert_eq!(session.status(), CheckoutStatus::Completed);
        session.mark_expired();
        assert_eq!(session.status(), CheckoutStatus::Completed);
    }
}
