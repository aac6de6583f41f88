//! Stateless ticket tokens.
//!
//! A ticket token binds a subject to an event until an expiry instant. It is
//! self-verifying, so any replica can check it without a server-side token store;
//! the registration store stays the final authority on attendance.
//!
//! # Wire format
//!
//! ```text
//! base64url_nopad( subjectId ":" eventId ":" expiryEpochMillis ":" nonceHex ":" macHex )
//!
//! macHex = hex( HMAC-SHA256(secret, subjectId ":" eventId ":" expiryEpochMillis ":" nonceHex) )
//! ```
//!
//! The nonce is fresh per mint, so two tokens minted in the same millisecond for the
//! same subject and event still differ. That matters because the token string itself
//! is the check-in lookup key.
//!
//! # Failure semantics
//!
//! Every verification failure is reported as the same [`InvalidToken`]. Callers cannot
//! tell expired from tampered from malformed; the distinction is only logged.

use crate::environment::Clock;
use crate::signature::HmacSigner;
use crate::types::{EventId, SubjectId, TicketClaims};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Random bytes per token nonce.
pub const NONCE_LEN: usize = 8;

/// Field separator inside the decoded token.
const SEPARATOR: char = ':';

/// Errors constructing a [`TokenCodec`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenCodecError {
    /// Signing secret is shorter than [`TokenCodec::MIN_SECRET_LEN`].
    #[error("ticket signing secret must be at least {min} bytes, got {actual}")]
    SecretTooShort {
        /// Required minimum
        min: usize,
        /// Provided length
        actual: usize,
    },
}

/// The single, deliberately uninformative verification failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid ticket token")]
pub struct InvalidToken;

/// Why a token was rejected. Logged, never returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Encoding,
    FieldCount,
    Signature,
    Subject,
    Event,
    Nonce,
    Expiry,
    Expired,
}

/// A freshly minted token and its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedTicket {
    /// Encoded token
    pub token: String,
    /// Expiry instant (millisecond precision)
    pub expires_at: DateTime<Utc>,
}

/// Mints and verifies ticket tokens.
#[derive(Clone)]
pub struct TokenCodec {
    signer: HmacSigner,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Minimum accepted signing secret length in bytes.
    pub const MIN_SECRET_LEN: usize = 32;

    /// Create a codec keyed with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenCodecError::SecretTooShort`] if the secret is shorter than
    /// [`Self::MIN_SECRET_LEN`] bytes.
    pub fn new(secret: impl AsRef<[u8]>, clock: Arc<dyn Clock>) -> Result<Self, TokenCodecError> {
        let secret = secret.as_ref();
        let too_short = TokenCodecError::SecretTooShort {
            min: Self::MIN_SECRET_LEN,
            actual: secret.len(),
        };
        if secret.len() < Self::MIN_SECRET_LEN {
            return Err(too_short);
        }
        let signer = HmacSigner::new(secret).ok_or(too_short)?;
        Ok(Self { signer, clock })
    }

    /// Mint a token binding `subject_id` to `event_id` for `ttl` from now.
    #[must_use]
    pub fn mint(&self, subject_id: SubjectId, event_id: EventId, ttl: Duration) -> MintedTicket {
        let expiry_millis = (self.clock.now() + ttl).timestamp_millis();

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let payload = format!(
            "{subject_id}{SEPARATOR}{event_id}{SEPARATOR}{expiry_millis}{SEPARATOR}{}",
            hex::encode(nonce)
        );
        let mac = self.signer.sign(payload.as_bytes());
        let token = URL_SAFE_NO_PAD.encode(format!("{payload}{SEPARATOR}{mac}"));

        MintedTicket {
            token,
            // Round-tripping through millis keeps the returned expiry identical to the encoded one.
            expires_at: DateTime::from_timestamp_millis(expiry_millis).unwrap_or_default(),
        }
    }

    /// Verify a token and return the subject and event it binds.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidToken`] if the token is malformed, carries a bad signature,
    /// or has expired (expiry at or before now).
    pub fn verify(&self, token: &str) -> Result<TicketClaims, InvalidToken> {
        self.inspect(token).map_err(|reason| {
            tracing::debug!(?reason, "Ticket token rejected");
            InvalidToken
        })
    }

    fn inspect(&self, token: &str) -> Result<TicketClaims, Rejection> {
        let decoded = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| Rejection::Encoding)?;
        let decoded = String::from_utf8(decoded).map_err(|_| Rejection::Encoding)?;

        let fields: Vec<&str> = decoded.split(SEPARATOR).collect();
        let [subject, event, expiry, nonce, mac] = fields.as_slice() else {
            return Err(Rejection::FieldCount);
        };

        // The MAC covers the exact received bytes, so a re-serialised form is never trusted.
        let signed_len = decoded.len() - mac.len() - 1;
        if !self.signer.verify(&decoded.as_bytes()[..signed_len], mac) {
            return Err(Rejection::Signature);
        }

        let subject_id: SubjectId = subject.parse().map_err(|_| Rejection::Subject)?;
        let event_id: EventId = event.parse().map_err(|_| Rejection::Event)?;
        if nonce.len() != NONCE_LEN * 2 || hex::decode(nonce).is_err() {
            return Err(Rejection::Nonce);
        }
        let expiry_millis: i64 = expiry.parse().map_err(|_| Rejection::Expiry)?;
        let expires_at =
            DateTime::from_timestamp_millis(expiry_millis).ok_or(Rejection::Expiry)?;

        if self.clock.now() >= expires_at {
            return Err(Rejection::Expired);
        }

        Ok(TicketClaims {
            subject_id,
            event_id,
            expires_at,
        })
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("signer", &self.signer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::{FixedClock, test_clock};

    const SECRET: &str = "an-adequately-long-test-signing-secret";

    fn codec_at(clock: FixedClock) -> TokenCodec {
        TokenCodec::new(SECRET, Arc::new(clock)).expect("valid secret")
    }

    #[test]
    fn test_short_secret_rejected() {
        let err = TokenCodec::new("short", Arc::new(test_clock())).unwrap_err();
        assert_eq!(
            err,
            TokenCodecError::SecretTooShort {
                min: TokenCodec::MIN_SECRET_LEN,
                actual: 5
            }
        );
    }

    #[test]
    fn test_mint_then_verify_before_expiry() {
        let clock = test_clock();
        let codec = codec_at(clock.clone());
        let subject = SubjectId::new();
        let event = EventId::new();

        let minted = codec.mint(subject, event, Duration::hours(12));
        assert_eq!(minted.expires_at, clock.now() + Duration::hours(12));

        let later = codec_at(FixedClock::new(clock.now() + Duration::hours(11)));
        let claims = later.verify(&minted.token).expect("token should verify");

        assert_eq!(claims.subject_id, subject);
        assert_eq!(claims.event_id, event);
        assert_eq!(claims.expires_at, minted.expires_at);
    }

    #[test]
    fn test_token_invalid_at_and_after_expiry() {
        let clock = test_clock();
        let minted =
            codec_at(clock.clone()).mint(SubjectId::new(), EventId::new(), Duration::hours(1));

        let at_expiry = codec_at(FixedClock::new(minted.expires_at));
        assert_eq!(at_expiry.verify(&minted.token), Err(InvalidToken));

        let after_expiry = codec_at(FixedClock::new(minted.expires_at + Duration::seconds(1)));
        assert_eq!(after_expiry.verify(&minted.token), Err(InvalidToken));
    }

    #[test]
    fn test_repeated_mints_differ() {
        let codec = codec_at(test_clock());
        let subject = SubjectId::new();
        let event = EventId::new();

        let first = codec.mint(subject, event, Duration::hours(1));
        let second = codec.mint(subject, event, Duration::hours(1));

        assert_eq!(first.expires_at, second.expires_at);
        assert_ne!(first.token, second.token);
    }

    #[test]
    fn test_decoded_layout() {
        let codec = codec_at(test_clock());
        let subject = SubjectId::new();
        let event = EventId::new();
        let minted = codec.mint(subject, event, Duration::minutes(5));

        assert!(!minted.token.contains('='));
        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&minted.token).unwrap()).unwrap();
        let fields: Vec<&str> = decoded.split(':').collect();

        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], subject.to_string());
        assert_eq!(fields[1], event.to_string());
        assert_eq!(fields[2], minted.expires_at.timestamp_millis().to_string());
        assert_eq!(fields[3].len(), NONCE_LEN * 2);
        assert_eq!(fields[4].len(), 64);
    }

    #[test]
    fn test_other_key_rejected() {
        let clock = test_clock();
        let minted =
            codec_at(clock.clone()).mint(SubjectId::new(), EventId::new(), Duration::hours(1));
        let other =
            TokenCodec::new("a-completely-different-signing-secret!", Arc::new(clock)).unwrap();

        assert_eq!(other.verify(&minted.token), Err(InvalidToken));
    }

    #[test]
    fn test_malformed_inputs_rejected() {
        let codec = codec_at(test_clock());

        assert_eq!(codec.verify(""), Err(InvalidToken));
        assert_eq!(codec.verify("not base64 at all!"), Err(InvalidToken));
        assert_eq!(codec.verify(&URL_SAFE_NO_PAD.encode("a:b:c")), Err(InvalidToken));
        assert_eq!(codec.verify(&URL_SAFE_NO_PAD.encode("a:b:c:d:e:f")), Err(InvalidToken));
        assert_eq!(codec.verify(&URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0xfd])), Err(InvalidToken));
    }

    #[test]
    fn test_forged_expiry_rejected() {
        let clock = test_clock();
        let codec = codec_at(clock.clone());
        let minted = codec.mint(SubjectId::new(), EventId::new(), Duration::hours(1));

        let decoded = String::from_utf8(URL_SAFE_NO_PAD.decode(&minted.token).unwrap()).unwrap();
        let mut fields: Vec<String> = decoded.split(':').map(str::to_string).collect();
        fields[2] = (minted.expires_at + Duration::days(365)).timestamp_millis().to_string();
        let forged = URL_SAFE_NO_PAD.encode(fields.join(":"));

        assert_eq!(codec.verify(&forged), Err(InvalidToken));
    }

    #[test]
    fn test_every_single_character_mutation_rejected() {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
        let codec = codec_at(test_clock());
        let minted = codec.mint(SubjectId::new(), EventId::new(), Duration::hours(1));
        let original = minted.token.as_bytes();

        for position in 0..original.len() {
            for &replacement in ALPHABET.iter().filter(|&&c| c != original[position]).take(3) {
                let mut mutated = original.to_vec();
                mutated[position] = replacement;
                let mutated = String::from_utf8(mutated).unwrap();

                assert_eq!(
                    codec.verify(&mutated),
                    Err(InvalidToken),
                    "mutation at position {position} was accepted"
                );
            }
        }
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_verify_returns_minted_claims(
                subject in any::<u128>(),
                event in any::<u128>(),
                ttl_secs in 1i64..(30 * 24 * 3600),
            ) {
                let codec = codec_at(test_clock());
                let subject = SubjectId::from_uuid(uuid::Uuid::from_u128(subject));
                let event = EventId::from_uuid(uuid::Uuid::from_u128(event));

                let minted = codec.mint(subject, event, Duration::seconds(ttl_secs));
                let claims = codec.verify(&minted.token).unwrap();

                prop_assert_eq!(claims.subject_id, subject);
                prop_assert_eq!(claims.event_id, event);
            }

            #[test]
            fn prop_arbitrary_strings_never_verify(input in "\\PC{0,200}") {
                let codec = codec_at(test_clock());
                prop_assert_eq!(codec.verify(&input), Err(InvalidToken));
            }
        }
    }
}
