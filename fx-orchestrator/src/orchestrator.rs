//! [`PaymentOrchestrator`]: owns the checkout-session registry, the event
//! bus, and the provider handle, and is the single place webhook intake and
//! the `initiate_payment` / `initiate_payout` entry points converge.

use std::sync::{atomic::{AtomicU64, Ordering}, Arc};

use fx_eventbus::{Event, EventBus, EventType};
use fx_registry::Registry;
use serde_json::Value;
use tracing::{info, warn};

use crate::checkout::CheckoutSession;
use crate::error::OrchestratorError;
use crate::provider::PaymentProvider;
use crate::webhook::{self, ProviderEvent, TransactionMetadata};

pub struct PaymentOrchestrator {
    pub(crate) checkouts: Registry<CheckoutSession>,
    pub(crate) bus: Arc<dyn EventBus>,
    pub(crate) provider: Arc<dyn PaymentProvider>,
    pub(crate) success_url: String,
    pub(crate) cancel_url: String,
    signing_secret: Vec<u8>,
    /// Resolves the fee-currency-fallback open question: incremented every
    /// time a balance-transaction lookup fails and the fee defaults to zero.
    fee_lookup_failures: AtomicU64,
}

impl PaymentOrchestrator {
    pub fn new(
        bus: Arc<dyn EventBus>,
        provider: Arc<dyn PaymentProvider>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        let orchestrator = Self {
            checkouts: Registry::builder("checkout").build(),
            bus,
            provider,
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
            signing_secret: Vec::new(),
            fee_lookup_failures: AtomicU64::new(0),
        };
        crate::handlers::register_all(&orchestrator.bus);
        orchestrator
    }

    pub fn with_signing_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.signing_secret = secret.into();
        self
    }

    pub fn fee_lookup_failures(&self) -> u64 {
        self.fee_lookup_failures.load(Ordering::Relaxed)
    }

    /// Verifies, parses, and dispatches a provider webhook. Matches the
    /// table: each provider event type maps to (at most) one domain event
    /// and whatever side effect it implies on the checkout registry.
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> Result<(), OrchestratorError> {
        if !webhook::verify_signature(&self.signing_secret, payload, signature) {
            return Err(OrchestratorError::SignatureInvalid);
        }
        let event = webhook::parse_payload(payload)?;

        match event.event_type.as_str() {
            "payment_intent.succeeded" => self.on_payment_succeeded(&event).await,
            "payment_intent.payment_failed" => self.on_payment_failed(&event).await,
            "checkout.session.completed" => self.on_checkout_completed(&event).await,
            "checkout.session.expired" => self.on_checkout_expired(&event).await,
            "transfer.created" => self.on_transfer_created(&event).await,
            "transfer.failed" => self.on_transfer_failed(&event).await,
            "transfer.reversed" => self.on_transfer_reversed(&event).await,
            "charge.succeeded" | "charge.updated" => self.on_charge_fees(&event).await,
            "account.updated" => self.on_account_updated(&event).await,
            "account.application.authorized" => self.on_onboarding_completed(&event).await,
            "capability.updated" => self.on_capability_updated(&event).await,
            other => {
                info!(event_type = other, "webhook: unhandled type, ignoring");
                Ok(())
            }
        }
    }

    async fn emit(&self, event_type: EventType, payload: Value, meta: &TransactionMetadata) -> Result<(), OrchestratorError> {
        let event = Event::new(event_type, payload)
            .with_user(meta.user_id.as_str())
            .with_account(meta.account_id.as_str())
            .with_correlation_id(meta.transaction_id.as_str());
        self.bus.emit(event).await.map_err(OrchestratorError::BusEmitFailed)
    }

    async fn on_payment_succeeded(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let meta = webhook::extract_transaction_metadata(&event.data)?;
        let amount = event.data.get("amount").cloned().unwrap_or(Value::Null);
        self.emit(
            EventType::PaymentCompleted,
            serde_json::json!({"transaction_id": meta.transaction_id, "amount": amount}),
            &meta,
        )
        .await
    }

    async fn on_payment_failed(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let meta = webhook::extract_transaction_metadata(&event.data)?;
        let reason = event.data.get("failure_message").cloned().unwrap_or(Value::Null);
        self.emit(
            EventType::PaymentFailed,
            serde_json::json!({"transaction_id": meta.transaction_id, "reason": reason}),
            &meta,
        )
        .await
    }

    async fn on_checkout_completed(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let meta = webhook::extract_transaction_metadata(&event.data)?;
        let session_id = event
            .data
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::MetadataInvalid("missing checkout session id".into()))?;

        let mut session = self.checkouts.get(session_id)?;
        session.mark_completed();
        self.checkouts.register(session).await?;

        self.emit(
            EventType::PaymentProcessed,
            serde_json::json!({"transaction_id": meta.transaction_id}),
            &meta,
        )
        .await?;
        self.emit(
            EventType::PaymentCompleted,
            serde_json::json!({"transaction_id": meta.transaction_id}),
            &meta,
        )
        .await
    }

    async fn on_checkout_expired(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let session_id = event
            .data
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::MetadataInvalid("missing checkout session id".into()))?;
        let mut session = self.checkouts.get(session_id)?;
        session.mark_expired();
        self.checkouts.register(session).await?;
        Ok(())
    }

    async fn on_transfer_created(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let meta = webhook::extract_transaction_metadata(&event.data)?;
        let amount = event.data.get("amount").cloned().unwrap_or(Value::Null);
        let partially_reversed = event
            .data
            .get("amount_reversed")
            .and_then(Value::as_i64)
            .map(|reversed| reversed > 0)
            .unwrap_or(false);

        self.emit(
            EventType::PaymentCompleted,
            serde_json::json!({"transaction_id": meta.transaction_id, "amount": negate_amount(&amount)}),
            &meta,
        )
        .await?;

        if partially_reversed {
            self.emit(
                EventType::PartialReversal,
                serde_json::json!({"transaction_id": meta.transaction_id}),
                &meta,
            )
            .await?;
        }
        Ok(())
    }

    async fn on_transfer_failed(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let meta = webhook::extract_transaction_metadata(&event.data)?;
        self.emit(
            EventType::PaymentFailed,
            serde_json::json!({"transaction_id": meta.transaction_id}),
            &meta,
        )
        .await
    }

    async fn on_transfer_reversed(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let meta = webhook::extract_transaction_metadata(&event.data)?;
        let reason = event.data.get("reversal_reason").cloned().unwrap_or(Value::Null);
        self.emit(
            EventType::PaymentFailed,
            serde_json::json!({"transaction_id": meta.transaction_id, "failure_reason": reason}),
            &meta,
        )
        .await
    }

    /// Fee resolution open question: when the balance-transaction lookup
    /// fails, fall back to the charge currency with a zero fee rather than
    /// failing the whole webhook, but surface it for operators.
    async fn on_charge_fees(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let meta = webhook::extract_transaction_metadata(&event.data)?;
        let charge_id = event
            .data
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::MetadataInvalid("missing charge id".into()))?;
        let balance_txn_id = event.data.get("balance_transaction").and_then(Value::as_str);

        let (fee_minor, currency) = match balance_txn_id {
            Some(id) => match self.provider.lookup_balance_transaction(id).await {
                Ok(txn) => (txn.fee_minor, txn.currency),
                Err(e) => {
                    warn!(error = %e, charge_id, "fee lookup failed, falling back to zero fee");
                    self.metrics_fee_lookup_failure();
                    (0, meta.currency.clone())
                }
            },
            None => {
                warn!(charge_id, "charge has no balance_transaction, falling back to zero fee");
                self.metrics_fee_lookup_failure();
                (0, meta.currency.clone())
            }
        };

        self.emit(
            EventType::FeesCalculated,
            serde_json::json!({
                "transaction_id": meta.transaction_id,
                "fee_minor": fee_minor,
                "currency": currency,
            }),
            &meta,
        )
        .await
    }

    fn metrics_fee_lookup_failure(&self) {
        self.fee_lookup_failures.fetch_add(1, Ordering::Relaxed);
    }

    async fn on_account_updated(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let details_submitted = event
            .data
            .get("details_submitted")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if details_submitted {
            self.emit_onboarding_completed(event).await?;
        }
        Ok(())
    }

    async fn on_onboarding_completed(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        self.emit_onboarding_completed(event).await
    }

    async fn on_capability_updated(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let active = event.data.get("status").and_then(Value::as_str) == Some("active");
        if active {
            self.emit_onboarding_completed(event).await?;
        }
        Ok(())
    }

    async fn emit_onboarding_completed(&self, event: &ProviderEvent) -> Result<(), OrchestratorError> {
        let account_id = event
            .data
            .get("account")
            .or_else(|| event.data.get("id"))
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::MetadataInvalid("missing account id".into()))?;

        let domain_event = Event::new(
            EventType::UserOnboardingCompleted,
            serde_json::json!({"account_id": account_id}),
        )
        .with_account(account_id);
        self.bus.emit(domain_event).await.map_err(OrchestratorError::BusEmitFailed)
    }
}

fn negate_amount(amount: &Value) -> Value {
    match amount.as_f64() {
        Some(n) => serde_json::json!(-n),
        None => amount.clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use fx_eventbus::MemoryBus;

    use super::*;
    use crate::provider::FakePaymentProvider;

    fn orchestrator() -> PaymentOrchestrator {
        PaymentOrchestrator::new(
            Arc::new(MemoryBus::new()),
            Arc::new(FakePaymentProvider::new("whsec_test")),
            "https://pay.example/success",
            "https://pay.example/cancel",
        )
        .with_signing_secret(*b"whsec_test")
    }

    fn metadata_json(uid: &str, aid: &str, tid: &str, currency: &str) -> serde_json::Value {
        serde_json::json!({
            "currency": currency,
            "metadata": {"user_id": uid, "account_id": aid, "transaction_id": tid},
        })
    }

    #[tokio::test]
    async fn unhandled_event_type_is_ignored_without_error() {
        let orchestrator = orchestrator();
        let payload = br#"{"type":"some.unknown.event","data":{}}"#;
        let sig = sign(b"whsec_test", payload);
        orchestrator.handle_webhook(payload, &sig).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected() {
        let orchestrator = orchestrator();
        let result = orchestrator
            .handle_webhook(br#"{"type":"payment_intent.succeeded","data":{}}"#, "deadbeef")
            .await;
        assert!(matches!(result, Err(OrchestratorError::SignatureInvalid)));
    }

    #[tokio::test]
    async fn payment_succeeded_requires_transaction_metadata() {
        let orchestrator = orchestrator();
        let payload = br#"{"type":"payment_intent.succeeded","data":{}}"#;
        let sig = sign(b"whsec_test", payload);
        let result = orchestrator.handle_webhook(payload, &sig).await;
        assert!(matches!(result, Err(OrchestratorError::MetadataInvalid(_))));
    }

    #[tokio::test]
    async fn payment_succeeded_emits_completed_with_valid_metadata() {
        let orchestrator = orchestrator();
        let uid = uuid::Uuid::new_v4().to_string();
        let mut data = metadata_json(&uid, &uid, &uid, "USD");
        data["amount"] = serde_json::json!(100.0);
        let body = serde_json::json!({"type": "payment_intent.succeeded", "data": data});
        let payload = serde_json::to_vec(&body).unwrap();
        let sig = sign(b"whsec_test", &payload);
        orchestrator.handle_webhook(&payload, &sig).await.unwrap();
    }

    fn sign(secret: &[u8], payload: &[u8]) -> String {
        let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret);
        let tag = ring::hmac::sign(&key, payload);
        tag.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
