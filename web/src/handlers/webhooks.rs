//! Payment provider webhook endpoint.
//!
//! The provider delivers at least once and retries on non-2xx. Deliveries that can
//! never succeed (forged, malformed) are acknowledged so they stop being retried;
//! only storage failures ask for redelivery.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use gatepass_core::{WebhookDisposition, WebhookError};
use serde::Serialize;

/// Header carrying the provider's HMAC-SHA256 of the raw body.
pub const WEBHOOK_SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Acknowledgement body.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    /// Always `"ok"`
    pub status: &'static str,
}

/// Receive one provider delivery.
///
/// The body is read as raw bytes; the signature covers them exactly.
///
/// # Endpoint
///
/// ```text
/// POST /api/webhooks/payments
/// X-Webhook-Signature: <hex hmac>
/// ```
///
/// # Errors
///
/// - 503 if the outcome could not be stored
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, AppError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.webhooks.handle(&body, signature).await {
        Ok(WebhookDisposition::Applied {
            order_id, update, ..
        }) => {
            tracing::debug!(order_id = %order_id, update = ?update, "Payment webhook applied");
        }
        Ok(WebhookDisposition::Ignored { .. }) => {}
        Err(WebhookError::Storage(error)) => return Err(error.into()),
        Err(error) => {
            tracing::debug!(
                outcome = error.outcome(),
                "Payment webhook acknowledged without effect"
            );
        }
    }

    Ok(Json(WebhookAck { status: "ok" }))
}
