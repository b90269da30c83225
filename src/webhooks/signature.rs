use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signing secret is not configured")]
    NotConfigured,
    #[error("signature is missing")]
    Missing,
    #[error("signature is not valid hex")]
    Malformed,
    #[error("signature does not match")]
    Mismatch,
}

/// HMAC-SHA256 over raw bytes, hex encoded.
///
/// Used with the webhook secret for deliveries and with the key secret for
/// the `order_id|payment_id` checkout callback signature.
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, SignatureError> {
        if self.secret.is_empty() {
            return Err(SignatureError::NotConfigured);
        }
        HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::NotConfigured)
    }

    pub fn sign(&self, payload: &[u8]) -> Result<String, SignatureError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time comparison against the supplied hex signature.
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(SignatureError::Missing)?;
        let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| SignatureError::Mismatch)
    }

    /// Checkout callback signature: HMAC over `"{order_id}|{payment_id}"`.
    pub fn verify_checkout(
        &self,
        provider_order_id: &str,
        provider_payment_id: &str,
        signature: &str,
    ) -> Result<(), SignatureError> {
        let payload = format!("{}|{}", provider_order_id, provider_payment_id);
        self.verify(payload.as_bytes(), Some(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_hmac() {
        // RFC 4231 test case 2
        let verifier = SignatureVerifier::new("Jefe");
        let sig = verifier.sign(b"what do ya want for nothing?").unwrap();
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert_eq!(
            verifier.verify(b"what do ya want for nothing?", Some(&sig)),
            Ok(())
        );
    }

    #[test]
    fn rejects_tampered_body_and_bad_headers() {
        let verifier = SignatureVerifier::new("whsec");
        let sig = verifier.sign(br#"{"event":"payment.captured"}"#).unwrap();

        assert_eq!(
            verifier.verify(br#"{"event":"payment.captured" }"#, Some(&sig)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verifier.verify(b"{}", None),
            Err(SignatureError::Missing)
        );
        assert_eq!(
            verifier.verify(b"{}", Some("not-hex")),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verifier.verify(b"{}", Some("abcd")),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn unconfigured_secret_never_verifies() {
        let verifier = SignatureVerifier::new("");
        assert_eq!(
            verifier.verify(b"{}", Some("00")),
            Err(SignatureError::NotConfigured)
        );
    }

    #[test]
    fn checkout_signature_covers_order_and_payment_ids() {
        let verifier = SignatureVerifier::new("key_secret");
        let sig = verifier.sign(b"order_A|pay_B").unwrap();

        assert!(verifier.verify_checkout("order_A", "pay_B", &sig).is_ok());
        assert!(verifier.verify_checkout("order_A", "pay_C", &sig).is_err());
    }
}
