//! The payment orchestrator: webhook intake, the provider-event dispatch
//! table, `initiate_payment` / `initiate_payout`, and the internal
//! business-flow handler registration matrix.

pub mod checkout;
pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod payments;
pub mod provider;
pub mod webhook;

pub use checkout::{CheckoutSession, CheckoutStatus};
pub use error::OrchestratorError;
pub use orchestrator::PaymentOrchestrator;
pub use payments::{InitiatePaymentResponse, InitiatePayoutResponse, PaymentStatus, PayoutResult};
pub use provider::{
    BalanceTransaction, CheckoutSessionRequest, ConnectedAccount, DestinationPayment, OnboardingLink,
    PaymentProvider, ProviderCheckoutSession, Transfer, TransferRequest,
};
