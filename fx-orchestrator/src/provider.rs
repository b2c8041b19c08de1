//! The [`PaymentProvider`] boundary: whatever third-party payment SDK the
//! orchestrator drives (Stripe is the reference implementation it is
//! modeled on, but the core only depends on this trait).

use std::collections::HashMap;

use async_trait::async_trait;
use fx_common::Money;

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub amount: Money,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ProviderCheckoutSession {
    pub id: String,
    pub url: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectedAccount {
    pub id: String,
    pub details_submitted: bool,
    /// Capability name (e.g. `"card_payments"`, `"transfers"`) to status
    /// (e.g. `"active"`, `"pending"`).
    pub capabilities: HashMap<String, String>,
}

impl ConnectedAccount {
    pub fn is_fully_onboarded(&self) -> bool {
        self.details_submitted
            && self.capabilities.get("card_payments").map(String::as_str) == Some("active")
            && self.capabilities.get("transfers").map(String::as_str) == Some("active")
    }
}

#[derive(Debug, Clone)]
pub struct OnboardingLink {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub amount: Money,
    pub destination: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DestinationPayment {
    pub amount_minor: i64,
}

#[derive(Debug, Clone)]
pub struct Transfer {
    pub id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub destination_payment: Option<DestinationPayment>,
    pub reversed: bool,
}

#[derive(Debug, Clone)]
pub struct BalanceTransaction {
    pub fee_minor: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Verifies a webhook's signature header over its raw payload.
    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool;

    async fn create_checkout_session(
        &self,
        req: CheckoutSessionRequest,
    ) -> anyhow::Result<ProviderCheckoutSession>;

    async fn create_connected_account(
        &self,
        metadata: &HashMap<String, String>,
    ) -> anyhow::Result<ConnectedAccount>;

    async fn create_onboarding_link(&self, account_id: &str) -> anyhow::Result<OnboardingLink>;

    async fn fetch_account(&self, account_id: &str) -> anyhow::Result<ConnectedAccount>;

    async fn create_transfer(&self, req: TransferRequest) -> anyhow::Result<Transfer>;

    async fn lookup_balance_transaction(&self, charge_id: &str) -> anyhow::Result<BalanceTransaction>;
}

/// An in-memory [`PaymentProvider`] fake, driven entirely by its
/// configuration so tests can force every branch of §4.5's payout logic.
#[cfg(any(test, feature = "test-util"))]
pub struct FakePaymentProvider {
    pub signing_secret: String,
    pub accounts: std::sync::Mutex<HashMap<String, ConnectedAccount>>,
    pub fee_minor: std::sync::atomic::AtomicI64,
}

#[cfg(any(test, feature = "test-util"))]
impl FakePaymentProvider {
    pub fn new(signing_secret: impl Into<String>) -> Self {
        Self {
            signing_secret: signing_secret.into(),
            accounts: std::sync::Mutex::new(HashMap::new()),
            fee_minor: std::sync::atomic::AtomicI64::new(250),
        }
    }

    pub fn seed_account(&self, account: ConnectedAccount) {
        self.accounts.lock().unwrap().insert(account.id.clone(), account);
    }
}

#[cfg(any(test, feature = "test-util"))]
#[async_trait]
impl PaymentProvider for FakePaymentProvider {
    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        signature == format!("fake-sig:{}:{}", self.signing_secret, payload.len())
    }

    async fn create_checkout_session(
        &self,
        req: CheckoutSessionRequest,
    ) -> anyhow::Result<ProviderCheckoutSession> {
        let id = format!("cs_{}", uuid::Uuid::new_v4());
        Ok(ProviderCheckoutSession {
            url: format!("{}?session={}", req.success_url, id),
            payment_intent_id: format!("pi_{}", uuid::Uuid::new_v4()),
            id,
        })
    }

    async fn create_connected_account(
        &self,
        _metadata: &HashMap<String, String>,
    ) -> anyhow::Result<ConnectedAccount> {
        let account = ConnectedAccount {
            id: format!("acct_{}", uuid::Uuid::new_v4()),
            details_submitted: false,
            capabilities: HashMap::new(),
        };
        self.seed_account(account.clone());
        Ok(account)
    }

    async fn create_onboarding_link(&self, account_id: &str) -> anyhow::Result<OnboardingLink> {
        Ok(OnboardingLink {
            url: format!("https://onboard.example/{account_id}"),
        })
    }

    async fn fetch_account(&self, account_id: &str) -> anyhow::Result<ConnectedAccount> {
        self.accounts
            .lock()
            .unwrap()
            .get(account_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such connected account: {account_id}"))
    }

    async fn create_transfer(&self, req: TransferRequest) -> anyhow::Result<Transfer> {
        Ok(Transfer {
            id: format!("tr_{}", uuid::Uuid::new_v4()),
            amount_minor: req.amount.amount_minor(),
            currency: req.amount.currency(),
            destination_payment: Some(DestinationPayment {
                amount_minor: req.amount.amount_minor()
                    - self.fee_minor.load(std::sync::atomic::Ordering::SeqCst),
            }),
            reversed: false,
        })
    }

    async fn lookup_balance_transaction(&self, _charge_id: &str) -> anyhow::Result<BalanceTransaction> {
        Ok(BalanceTransaction {
            fee_minor: self.fee_minor.load(std::sync::atomic::Ordering::SeqCst),
            currency: "USD".to_string(),
        })
    }
}
