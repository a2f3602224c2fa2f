//! HMAC-SHA256 validation of webhook delivery signatures.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretBox};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Validates `X-Hub-Signature-256` headers against the shared secret.
///
/// Comparison is constant-time over the hex encoding to avoid leaking the
/// expected signature through timing.
pub struct SignatureValidator {
    secret: SecretBox<Vec<u8>>,
}

impl SignatureValidator {
    /// Wraps the shared webhook secret.
    #[must_use]
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret: SecretBox::new(Box::new(secret)),
        }
    }

    /// Verifies `signature_header` against `body`.
    ///
    /// # Errors
    ///
    /// [`WebhookError::InvalidSignatureFormat`] when the header does not
    /// have the `sha256=<hex>` shape, [`WebhookError::InvalidSignature`]
    /// when the HMAC does not match.
    pub fn verify(&self, body: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        let provided = signature_header
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(WebhookError::InvalidSignatureFormat)?;
        if provided.len() != 64 || !provided.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(WebhookError::InvalidSignatureFormat);
        }

        let expected = self.compute(body);
        let provided = provided.to_ascii_lowercase();

        if bool::from(expected.as_bytes().ct_eq(provided.as_bytes())) {
            Ok(())
        } else {
            Err(WebhookError::InvalidSignature)
        }
    }

    fn compute(&self, body: &[u8]) -> String {
        // The key length is unconstrained for HMAC, so this cannot fail.
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret())
            .expect("hmac accepts any key length");
        mac.update(body);
        hex_encode(&mac.finalize().into_bytes())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(64), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    })
}
