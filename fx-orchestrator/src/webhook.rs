//! Webhook intake: signature verification, payload parsing, and the
//! metadata contract every provider event carrying a transaction must
//! satisfy.

use ring::hmac;
use serde::Deserialize;
use serde_json::Value;

use crate::error::OrchestratorError;

/// The provider's raw webhook body, parsed just enough to route it: a
/// `type` tag and an opaque `data` object whose shape depends on the tag.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

/// Verifies an HMAC-SHA256 webhook signature over the raw request body.
/// `signature` is the hex-encoded digest taken from the provider's
/// signature header.
pub fn verify_signature(signing_secret: &[u8], payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex_decode(signature) else {
        return false;
    };
    let key = hmac::Key::new(hmac::HMAC_SHA256, signing_secret);
    hmac::verify(&key, payload, &expected).is_ok()
}

fn hex_decode(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

pub fn parse_payload(payload: &[u8]) -> Result<ProviderEvent, OrchestratorError> {
    serde_json::from_slice(payload)
        .map_err(|e| OrchestratorError::MetadataInvalid(format!("unparseable webhook payload: {e}")))
}

/// The metadata every provider event carrying a transaction must include:
/// `user_id`, `account_id`, `transaction_id` (UUIDs) and `currency`
/// (ISO 4217).
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    pub user_id: String,
    pub account_id: String,
    pub transaction_id: String,
    pub currency: String,
}

pub fn extract_transaction_metadata(data: &Value) -> Result<TransactionMetadata, OrchestratorError> {
    let metadata = data
        .get("metadata")
        .ok_or_else(|| OrchestratorError::MetadataInvalid("missing metadata object".into()))?;

    let field = |key: &str| -> Result<String, OrchestratorError> {
        metadata
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OrchestratorError::MetadataInvalid(format!("missing metadata.{key}")))
    };

    let user_id = field("user_id")?;
    let account_id = field("account_id")?;
    let transaction_id = field("transaction_id")?;
    // Providers send lowercase currency codes (e.g. Stripe's "usd"); upper
    // the wire and store the normalized ISO 4217 form downstream.
    let currency = data
        .get("currency")
        .and_then(Value::as_str)
        .map(str::to_ascii_uppercase)
        .ok_or_else(|| OrchestratorError::MetadataInvalid("missing currency".into()))?;

    for (name, value) in [
        ("user_id", &user_id),
        ("account_id", &account_id),
        ("transaction_id", &transaction_id),
    ] {
        if uuid::Uuid::parse_str(value).is_err() {
            return Err(OrchestratorError::MetadataInvalid(format!("metadata.{name} is not a uuid")));
        }
    }
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(OrchestratorError::MetadataInvalid(format!(
            "currency {currency} is not a valid ISO 4217 code"
        )));
    }

    Ok(TransactionMetadata {
        user_id,
        account_id,
        transaction_id,
        currency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &[u8], payload: &[u8]) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
        let tag = hmac::sign(&key, payload);
        tag.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn verifies_valid_signature() {
        let secret = b"whsec_test";
        let payload = b"{\"type\":\"payment_intent.succeeded\"}";
        let signature = sign(secret, payload);
        assert!(verify_signature(secret, payload, &signature));
    }

    #[test]
    fn rejects_tampered_payload() {
        let secret = b"whsec_test";
        let signature = sign(secret, b"original");
        assert!(!verify_signature(secret, b"tampered", &signature));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(!verify_signature(b"secret", b"payload", "not-hex"));
    }

    #[test]
    fn parses_minimal_event() {
        let event = parse_payload(br#"{"type":"payment_intent.succeeded","data":{}}"#).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
    }

    #[test]
    fn extracts_valid_metadata() {
        let uid = uuid::Uuid::new_v4().to_string();
        let aid = uuid::Uuid::new_v4().to_string();
        let tid = uuid::Uuid::new_v4().to_string();
        let data = serde_json::json!({
            "currency": "USD",
            "metadata": {"user_id": uid, "account_id": aid, "transaction_id": tid},
        });
        let meta = extract_transaction_metadata(&data).unwrap();
        assert_eq!(meta.currency, "USD");
        assert_eq!(meta.user_id, uid);
    }

    #[test]
    fn rejects_missing_metadata_field() {
        let data = serde_json::json!({"currency": "USD", "metadata": {"user_id": "not-a-uuid"}});
        assert!(matches!(
            extract_transaction_metadata(&data),
            Err(OrchestratorError::MetadataInvalid(_))
        ));
    }

    #[test]
    fn rejects_non_uuid_id() {
        let data = serde_json::json!({
            "currency": "USD",
            "metadata": {"user_id": "bob", "account_id": "acct", "transaction_id": "tx"},
        });
        assert!(matches!(
            extract_transaction_metadata(&data),
            Err(OrchestratorError::MetadataInvalid(_))
        ));
    }

    #[test]
    fn normalizes_lowercase_currency() {
        let uid = uuid::Uuid::new_v4().to_string();
        let data = serde_json::json!({
            "currency": "usd",
            "metadata": {"user_id": uid.clone(), "account_id": uid.clone(), "transaction_id": uid},
        });
        let meta = extract_transaction_metadata(&data).unwrap();
        assert_eq!(meta.currency, "USD");
    }

    #[test]
    fn rejects_non_alphabetic_currency() {
        let uid = uuid::Uuid::new_v4().to_string();
        let data = serde_json::json!({
            "currency": "u5d",
            "metadata": {"user_id": uid.clone(), "account_id": uid.clone(), "transaction_id": uid},
        });
        assert!(matches!(
            extract_transaction_metadata(&data),
            Err(OrchestratorError::MetadataInvalid(_))
        ));
    }
}
