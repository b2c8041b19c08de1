//! `initiate_payment` / `initiate_payout`: the two calls the rest of the
//! platform makes into the orchestrator directly (as opposed to the
//! webhook intake path, which is provider-driven).

use std::collections::HashMap;
use std::time::Duration;

use fx_common::{Money, TimestampMs};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::checkout::CheckoutSession;
use crate::error::OrchestratorError;
use crate::orchestrator::PaymentOrchestrator;
use crate::provider::{CheckoutSessionRequest, TransferRequest};

const PAYOUT_ARRIVAL_DELAY: Duration = Duration::from_secs(2 * 24 * 60 * 60);

fn ensure_positive(amount: Money) -> Result<(), OrchestratorError> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(fx_common::MoneyError::NotPositive(amount.amount_minor()).into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    /// Distinct from `Failed`: the transfer went through and was later
    /// partially clawed back. See `PartialReversal` on the event bus.
    PartiallyReversed,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiatePaymentResponse {
    pub status: PaymentStatus,
    pub payment_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum InitiatePayoutResponse {
    OnboardingRequired { onboarding_url: String },
    Completed(PayoutResult),
}

#[derive(Debug, Clone, Serialize)]
pub struct PayoutResult {
    pub payout_id: String,
    pub payment_provider_id: String,
    pub status: PaymentStatus,
    pub fee_minor: i64,
    pub currency: String,
    pub estimated_arrival: TimestampMs,
}

impl PaymentOrchestrator {
    pub async fn initiate_payment(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
        amount: Money,
    ) -> Result<InitiatePaymentResponse, OrchestratorError> {
        ensure_positive(amount)?;

        let mut metadata = HashMap::new();
        metadata.insert("transaction_id".to_string(), transaction_id.to_string());
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("account_id".to_string(), account_id.to_string());

        let req = CheckoutSessionRequest {
            amount,
            description: format!("payment {transaction_id}"),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
            metadata,
        };
        let session = self.provider.create_checkout_session(req).await?;

        let checkout = CheckoutSession::new(
            transaction_id,
            user_id,
            account_id,
            amount,
            &session.id,
            &session.url,
        );
        self.checkouts.register(checkout).await?;

        self.emit_payment_initiated(user_id, account_id, transaction_id, amount).await?;

        info!(transaction_id, payment_id = %session.payment_intent_id, "payment initiated");
        Ok(InitiatePaymentResponse {
            status: PaymentStatus::Pending,
            payment_id: session.payment_intent_id,
            checkout_url: session.url,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn initiate_payout(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
        payment_provider_id: &str,
        amount: Money,
        destination: &str,
        metadata: HashMap<String, String>,
    ) -> Result<InitiatePayoutResponse, OrchestratorError> {
        ensure_positive(amount)?;

        let account_id_for_account = if payment_provider_id.is_empty() {
            let account = self.provider.create_connected_account(&metadata).await?;
            account.id
        } else {
            payment_provider_id.to_string()
        };

        if payment_provider_id.is_empty() {
            let link = self.provider.create_onboarding_link(&account_id_for_account).await?;
            info!(account_id, "connected account created, onboarding required");
            return Ok(InitiatePayoutResponse::OnboardingRequired {
                onboarding_url: link.url,
            });
        }

        let account = self.provider.fetch_account(&account_id_for_account).await?;
        if !account.is_fully_onboarded() {
            let link = self.provider.create_onboarding_link(&account_id_for_account).await?;
            return Ok(InitiatePayoutResponse::OnboardingRequired {
                onboarding_url: link.url,
            });
        }

        let mut transfer_metadata = metadata;
        transfer_metadata.insert("transaction_id".to_string(), transaction_id.to_string());
        transfer_metadata.insert("user_id".to_string(), user_id.to_string());
        transfer_metadata.insert("account_id".to_string(), account_id.to_string());

        let transfer = self
            .provider
            .create_transfer(TransferRequest {
                amount,
                destination: destination.to_string(),
                metadata: transfer_metadata,
            })
            .await?;

        let status = if transfer.reversed {
            PaymentStatus::Failed
        } else {
            match &transfer.destination_payment {
                Some(dest) if dest.amount_minor < transfer.amount_minor => PaymentStatus::PartiallyReversed,
                Some(_) => PaymentStatus::Completed,
                None => PaymentStatus::Pending,
            }
        };

        let fee_minor = transfer
            .destination_payment
            .as_ref()
            .map(|dest| (transfer.amount_minor - dest.amount_minor).max(0))
            .unwrap_or(0);

        self.emit_payout_completed(user_id, account_id, transaction_id, amount, status)
            .await?;

        let estimated_arrival = TimestampMs::now()
            .checked_add_duration(PAYOUT_ARRIVAL_DELAY)
            .unwrap_or_else(TimestampMs::now);

        info!(transaction_id, transfer_id = %transfer.id, ?status, "payout initiated");
        Ok(InitiatePayoutResponse::Completed(PayoutResult {
            payout_id: transfer.id,
            payment_provider_id: account_id_for_account,
            status,
            fee_minor,
            currency: transfer.currency,
            estimated_arrival,
        }))
    }
}

impl PaymentOrchestrator {
    async fn emit_payment_initiated(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
        amount: Money,
    ) -> Result<(), OrchestratorError> {
        use fx_eventbus::{Event, EventType};

        let event = Event::new(
            EventType::PaymentInitiated,
            serde_json::json!({
                "transaction_id": transaction_id,
                "amount": amount.to_wire(),
            }),
        )
        .with_user(user_id)
        .with_account(account_id)
        .with_correlation_id(transaction_id);

        self.bus.emit(event).await.map_err(|e| {
            warn!(error = %e, transaction_id, "failed to emit payment_initiated");
            OrchestratorError::BusEmitFailed(e)
        })
    }

    async fn emit_payout_completed(
        &self,
        user_id: &str,
        account_id: &str,
        transaction_id: &str,
        amount: Money,
        status: PaymentStatus,
    ) -> Result<(), OrchestratorError> {
        use fx_eventbus::{Event, EventType};

        let event = Event::new(
            EventType::PaymentCompleted,
            serde_json::json!({
                "transaction_id": transaction_id,
                "amount": amount.negate().to_wire(),
                "status": status,
            }),
        )
        .with_user(user_id)
        .with_account(account_id)
        .with_correlation_id(transaction_id);
        self.bus.emit(event).await.map_err(OrchestratorError::BusEmitFailed)?;

        if status == PaymentStatus::PartiallyReversed {
            let reversal = Event::new(
                fx_eventbus::EventType::PartialReversal,
                serde_json::json!({ "transaction_id": transaction_id }),
            )
            .with_user(user_id)
            .with_account(account_id)
            .with_correlation_id(transaction_id);
            self.bus
                .emit(reversal)
                .await
                .map_err(OrchestratorError::BusEmitFailed)?;
        }
        Ok(())
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
    }

    #[tokio::test]
    async fn initiate_payment_persists_checkout_and_returns_pending() {
        let orchestrator = orchestrator();
        let response = orchestrator
            .initiate_payment("u1", "a1", "tx1", Money::new(5000, "USD"))
            .await
            .unwrap();
        assert_eq!(response.status, PaymentStatus::Pending);
        assert!(orchestrator.checkouts.count() == 1);
    }

    #[tokio::test]
    async fn initiate_payment_rejects_non_positive_amount() {
        let orchestrator = orchestrator();
        let err = orchestrator
            .initiate_payment("u1", "a1", "tx1", Money::new(0, "USD"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn payout_with_no_provider_id_requires_onboarding() {
        let orchestrator = orchestrator();
        let response = orchestrator
            .initiate_payout("u1", "a1", "tx1", "", Money::new(5000, "USD"), "bank_acct_1", HashMap::new())
            .await
            .unwrap();
        assert!(matches!(response, InitiatePayoutResponse::OnboardingRequired { .. }));
    }

    #[tokio::test]
    async fn payout_with_fully_onboarded_account_completes() {
        let orchestrator = orchestrator();
        let fake = FakePaymentProvider::new("whsec_test");
        let mut capabilities = HashMap::new();
        capabilities.insert("card_payments".to_string(), "active".to_string());
        capabilities.insert("transfers".to_string(), "active".to_string());
        fake.seed_account(crate::provider::ConnectedAccount {
            id: "acct_1".to_string(),
            details_submitted: true,
            capabilities,
        });
        let orchestrator = PaymentOrchestrator::new(
            orchestrator.bus.clone(),
            Arc::new(fake),
            "https://pay.example/success",
            "https://pay.example/cancel",
        );
        let response = orchestrator
            .initiate_payout(
                "u1",
                "a1",
                "tx1",
                "acct_1",
                Money::new(5000, "USD"),
                "bank_acct_1",
                HashMap::new(),
            )
            .await
            .unwrap();
        match response {
            InitiatePayoutResponse::Completed(result) => {
                assert_eq!(result.status, PaymentStatus::Completed);
                assert_eq!(result.fee_minor, 250);
            }
            _ => panic!("expected a completed payout"),
        }
    }
}
