//! Payment provider webhook reconciliation.
//!
//! Deliveries are at-least-once and unordered. A delivery is authenticated over its
//! exact raw bytes before anything is parsed; after that it only ever feeds
//! [`RegistrationLedger::apply_payment_outcome`], whose conditional update makes
//! duplicates and reorderings harmless.
//!
//! # Payload
//!
//! ```json
//! { "event": "payment.captured",
//!   "payload": { "payment": { "entity": { "order_id": "order_123" } } } }
//! ```
//!
//! The order id is read from `payload.payment.entity.order_id`, falling back to
//! `payload.order.entity.id`.

use crate::ledger::RegistrationLedger;
use crate::signature::HmacSigner;
use crate::store::{PaymentUpdate, StoreError};
use crate::telemetry;
use crate::types::PaymentOutcome;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Webhook handling failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// The signature did not match the raw body.
    #[error("invalid webhook signature")]
    InvalidSignature,
    /// Authenticated body could not be interpreted.
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
    /// The outcome could not be stored; the provider should redeliver.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl WebhookError {
    /// Short outcome label for logs and metrics.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "invalid_signature",
            Self::MalformedPayload(_) => "malformed",
            Self::Storage(_) => "storage_error",
        }
    }
}

/// The webhook secret was empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("payment webhook secret must not be empty")]
pub struct EmptyWebhookSecret;

/// What an accepted delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// A payment outcome was applied (possibly as a no-op).
    Applied {
        /// Gateway order id
        order_id: String,
        /// Reported outcome
        outcome: PaymentOutcome,
        /// Effect on stored registrations
        update: PaymentUpdate,
    },
    /// The event type is not one we act on.
    Ignored {
        /// Provider event type
        event_type: String,
    },
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    payment: Option<Wrapped<PaymentEntity>>,
    order: Option<Wrapped<OrderEntity>>,
}

#[derive(Debug, Deserialize)]
struct Wrapped<T> {
    entity: T,
}

#[derive(Debug, Deserialize)]
struct PaymentEntity {
    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    id: Option<String>,
}

impl Envelope {
    fn outcome(&self) -> Option<PaymentOutcome> {
        match self.event.as_str() {
            "payment.captured" | "order.paid" => Some(PaymentOutcome::Succeeded),
            "payment.failed" => Some(PaymentOutcome::Failed),
            _ => None,
        }
    }

    fn order_id(&self) -> Option<&str> {
        let from_payment = self
            .payload
            .payment
            .as_ref()
            .and_then(|payment| payment.entity.order_id.as_deref());
        let from_order = self
            .payload
            .order
            .as_ref()
            .and_then(|order| order.entity.id.as_deref());
        from_payment
            .or(from_order)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Authenticates provider webhooks and applies their payment outcomes.
#[derive(Clone)]
pub struct WebhookReconciler {
    ledger: Arc<RegistrationLedger>,
    signer: HmacSigner,
}

impl WebhookReconciler {
    /// Creates a reconciler verifying deliveries with `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyWebhookSecret`] if `secret` is empty.
    pub fn new(
        ledger: Arc<RegistrationLedger>,
        secret: impl AsRef<[u8]>,
    ) -> Result<Self, EmptyWebhookSecret> {
        let signer = HmacSigner::new(secret.as_ref()).ok_or(EmptyWebhookSecret)?;
        Ok(Self { ledger, signer })
    }

    /// Handle one delivery.
    ///
    /// `signature` is the provider's hex HMAC-SHA256 header value; surrounding
    /// whitespace, letter case and a `sha256=` prefix are tolerated.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::InvalidSignature`] if the body is not authentic; nothing is parsed
    /// - [`WebhookError::MalformedPayload`] if an authentic body cannot be interpreted
    /// - [`WebhookError::Storage`] if the outcome could not be stored
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<WebhookDisposition, WebhookError> {
        let result = self.reconcile(raw_body, signature).await;
        telemetry::record_webhook(match &result {
            Ok(WebhookDisposition::Applied { .. }) => "applied",
            Ok(WebhookDisposition::Ignored { .. }) => "ignored",
            Err(error) => error.outcome(),
        });
        result
    }

    async fn reconcile(
        &self,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<WebhookDisposition, WebhookError> {
        let signature = normalize_signature(signature);
        if !self.signer.verify(raw_body, &signature) {
            tracing::warn!(
                target: "gatepass::security",
                body_len = raw_body.len(),
                "Payment webhook rejected: signature mismatch"
            );
            return Err(WebhookError::InvalidSignature);
        }

        let envelope: Envelope = serde_json::from_slice(raw_body).map_err(|e| {
            tracing::warn!(error = %e, "Authenticated payment webhook is not valid JSON");
            WebhookError::MalformedPayload(e.to_string())
        })?;

        let Some(outcome) = envelope.outcome() else {
            tracing::debug!(event_type = %envelope.event, "Payment webhook event ignored");
            return Ok(WebhookDisposition::Ignored {
                event_type: envelope.event,
            });
        };

        let order_id = envelope.order_id().ok_or_else(|| {
            tracing::warn!(event_type = %envelope.event, "Payment webhook without order id");
            WebhookError::MalformedPayload(format!("{} without order id", envelope.event))
        })?;

        let update = self.ledger.apply_payment_outcome(order_id, outcome).await?;
        Ok(WebhookDisposition::Applied {
            order_id: order_id.to_string(),
            outcome,
            update,
        })
    }
}

fn normalize_signature(header: &str) -> String {
    let trimmed = header.trim();
    let hex = trimmed.strip_prefix("sha256=").unwrap_or(trimmed);
    hex.to_ascii_lowercase()
}
