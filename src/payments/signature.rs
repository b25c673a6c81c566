use anyhow::{Result, anyhow};
use hmac::{Hmac, Mac};
use mockall::automock;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SignatureError {
    /// The claimed signature does not match. Permanent, never retried.
    #[error("signature mismatch")]
    Mismatch,
    /// The check itself could not run.
    #[error("signature verification unavailable: {0}")]
    Unavailable(anyhow::Error),
}

#[automock]
pub trait SignatureVerifier: Send + Sync + 'static {
    fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<(), SignatureError>;

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<(), SignatureError>;
}

/// Holds the gateway secrets loaded at startup. Read-only afterwards.
pub struct GatewaySignatureVerifier {
    key_secret: String,
    webhook_secret: String,
}

impl GatewaySignatureVerifier {
    pub fn new(key_secret: String, webhook_secret: String) -> Self {
        Self {
            key_secret,
            webhook_secret,
        }
    }
}

impl SignatureVerifier for GatewaySignatureVerifier {
    fn verify_payment(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> Result<(), SignatureError> {
        verify_payment_signature(
            &self.key_secret,
            gateway_order_id,
            gateway_payment_id,
            signature,
        )
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> Result<(), SignatureError> {
        verify_webhook_signature(&self.webhook_secret, payload, signature)
    }
}

/// Checks the checkout callback signature: hex HMAC-SHA256 of `"{order_id}|{payment_id}"`.
pub fn verify_payment_signature(
    secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> Result<(), SignatureError> {
    if gateway_order_id.is_empty() || gateway_payment_id.is_empty() || signature.is_empty() {
        return Err(SignatureError::Mismatch);
    }

    let mut mac = new_mac(secret)?;
    mac.update(payment_message(gateway_order_id, gateway_payment_id).as_bytes());
    verify_hex(mac, signature)
}

/// Checks an out-of-band webhook: hex HMAC-SHA256 of the raw request body.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &[u8],
    signature: &str,
) -> Result<(), SignatureError> {
    if payload.is_empty() || signature.is_empty() {
        return Err(SignatureError::Mismatch);
    }

    let mut mac = new_mac(secret)?;
    mac.update(payload);
    verify_hex(mac, signature)
}

pub fn sign_payment(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> Result<String> {
    let mut mac = new_mac(secret)?;
    mac.update(payment_message(gateway_order_id, gateway_payment_id).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn sign_payload(secret: &str, payload: &[u8]) -> Result<String> {
    let mut mac = new_mac(secret)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn payment_message(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    format!("{gateway_order_id}|{gateway_payment_id}")
}

fn new_mac(secret: &str) -> Result<HmacSha256, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::Unavailable(anyhow!(
            "gateway signing secret is not configured"
        )));
    }

    HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| SignatureError::Unavailable(anyhow!(err)))
}

fn verify_hex(mac: HmacSha256, signature: &str) -> Result<(), SignatureError> {
    let provided = hex::decode(signature.trim()).map_err(|_| SignatureError::Mismatch)?;

    // `verify_slice` compares in constant time.
    mac.verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "rzp_test_secret";

    #[test]
    fn accepts_signature_over_order_and_payment_ids() {
        let signature = sign_payment(SECRET, "ord_1", "pay_1").unwrap();

        assert!(verify_payment_signature(SECRET, "ord_1", "pay_1", &signature).is_ok());
    }

    #[test]
    fn matches_known_hmac_of_joined_ids() {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(b"ord_1|pay_1");
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(sign_payment(SECRET, "ord_1", "pay_1").unwrap(), expected);
    }

    #[test]
    fn rejects_signature_for_swapped_ids() {
        let signature = sign_payment(SECRET, "ord_1", "pay_1").unwrap();

        let result = verify_payment_signature(SECRET, "pay_1", "ord_1", &signature);
        assert!(matches!(result, Err(SignatureError::Mismatch)));
    }

    #[test]
    fn rejects_signature_made_with_other_secret() {
        let signature = sign_payment("another_secret", "ord_1", "pay_1").unwrap();

        let result = verify_payment_signature(SECRET, "ord_1", "pay_1", &signature);
        assert!(matches!(result, Err(SignatureError::Mismatch)));
    }

    #[test]
    fn empty_inputs_and_non_hex_are_mismatches() {
        assert!(matches!(
            verify_payment_signature(SECRET, "", "pay_1", "abcd"),
            Err(SignatureError::Mismatch)
        ));
        assert!(matches!(
            verify_payment_signature(SECRET, "ord_1", "pay_1", ""),
            Err(SignatureError::Mismatch)
        ));
        assert!(matches!(
            verify_payment_signature(SECRET, "ord_1", "pay_1", "not-hex"),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn missing_secret_is_unavailable_not_mismatch() {
        let result = verify_payment_signature("", "ord_1", "pay_1", "abcd");
        assert!(matches!(result, Err(SignatureError::Unavailable(_))));
    }

    #[test]
    fn webhook_signature_covers_raw_body() {
        let body = br#"{"event":"payment.captured"}"#;
        let signature = sign_payload(SECRET, body).unwrap();

        assert!(verify_webhook_signature(SECRET, body, &signature).is_ok());
        assert!(matches!(
            verify_webhook_signature(SECRET, br#"{"event":"order.paid"}"#, &signature),
            Err(SignatureError::Mismatch)
        ));
    }

    #[test]
    fn verifier_uses_separate_webhook_secret() {
        let verifier = GatewaySignatureVerifier::new(SECRET.to_string(), "whsec".to_string());
        let body = b"{}";

        let with_key_secret = sign_payload(SECRET, body).unwrap();
        let with_webhook_secret = sign_payload("whsec", body).unwrap();

        assert!(verifier.verify_webhook(body, &with_key_secret).is_err());
        assert!(verifier.verify_webhook(body, &with_webhook_secret).is_ok());
    }
}
