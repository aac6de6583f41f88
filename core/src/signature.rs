//! Keyed HMAC-SHA256 signing shared by ticket tokens and webhook verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 keyed with a server-held secret.
///
/// The keyed state is prepared once and cloned per signature, so signing never
/// re-validates the key.
#[derive(Clone)]
pub struct HmacSigner {
    mac: HmacSha256,
}

impl HmacSigner {
    /// Create a signer from a secret.
    ///
    /// HMAC accepts keys of any length; `None` is returned only for an empty
    /// secret, which would leave every signature forgeable.
    #[must_use]
    pub fn new(secret: &[u8]) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        HmacSha256::new_from_slice(secret)
            .ok()
            .map(|mac| Self { mac })
    }

    /// Lowercase hex HMAC of `message`.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(message);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check a lowercase hex signature against `message` in constant time.
    ///
    /// The comparison is exact: callers normalise untrusted header values first.
    #[must_use]
    pub fn verify(&self, message: &[u8], provided: &str) -> bool {
        let expected = self.sign(message);
        constant_time_eq::constant_time_eq(expected.as_bytes(), provided.as_bytes())
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner").field("key", &"[redacted]").finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_secret_rejected() {
        assert!(HmacSigner::new(b"").is_none());
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signer = HmacSigner::new(b"Jefe").unwrap();
        assert_eq!(
            signer.sign(b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_is_case_sensitive() {
        let signer = HmacSigner::new(b"secret").unwrap();
        let signature = signer.sign(b"body");
        assert!(signer.verify(b"body", &signature));
        assert!(!signer.verify(b"body", &signature.to_ascii_uppercase()));
    }

    #[test]
    fn test_verify_rejects_other_message_and_key() {
        let signer = HmacSigner::new(b"secret").unwrap();
        let other = HmacSigner::new(b"other-secret").unwrap();
        let signature = signer.sign(b"body");

        assert!(!signer.verify(b"body!", &signature));
        assert!(!other.verify(b"body", &signature));
        assert!(!signer.verify(b"body", ""));
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let signer = HmacSigner::new(b"super-secret-key").unwrap();
        assert!(!format!("{signer:?}").contains("super-secret-key"));
    }
}
