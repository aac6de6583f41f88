//! Registration endpoints.
//!
//! - `POST /api/events/:event_id/registrations` - register the caller
//! - `GET /api/events/:event_id/registrations` - list an event's registrations (staff)
//! - `GET /api/registrations/me` - the caller's own registrations, with tickets

use crate::error::AppError;
use crate::extractors::Identity;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use gatepass_core::{EventId, PaymentOrder, PaymentState, Registration, RegistrationReceipt};
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// Response Types
// ============================================================================

/// Payment order the client must complete with the provider.
#[derive(Debug, Serialize)]
pub struct PaymentOrderResponse {
    /// Provider order id
    pub order_id: String,
    /// Amount due in minor units
    pub amount_minor: u64,
    /// ISO currency code
    pub currency: String,
}

impl From<PaymentOrder> for PaymentOrderResponse {
    fn from(order: PaymentOrder) -> Self {
        Self {
            order_id: order.order_id,
            amount_minor: order.amount.minor_units,
            currency: order.amount.currency.to_string(),
        }
    }
}

/// Response after registering.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// New registration id
    pub registration_id: Uuid,
    /// Signed ticket to present at the door
    pub ticket_token: String,
    /// When the ticket stops verifying
    pub ticket_expires_at: DateTime<Utc>,
    /// `PAID` for free events, `PENDING` until the provider confirms otherwise
    pub payment_state: PaymentState,
    /// Present for paid events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_order: Option<PaymentOrderResponse>,
}

impl From<RegistrationReceipt> for RegisterResponse {
    fn from(receipt: RegistrationReceipt) -> Self {
        let registration = receipt.registration;
        Self {
            registration_id: *registration.id.as_uuid(),
            ticket_token: registration.ticket_token,
            ticket_expires_at: registration.ticket_expires_at,
            payment_state: registration.payment_state,
            payment_order: receipt.payment_order.map(Into::into),
        }
    }
}

/// One registration as listed.
///
/// The ticket token is only included when the caller is the holder.
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    /// Registration id
    pub id: Uuid,
    /// Registered subject
    pub subject_id: Uuid,
    /// Event
    pub event_id: Uuid,
    /// Payment state
    pub payment_state: PaymentState,
    /// Provider order id, for paid events
    pub payment_order_id: Option<String>,
    /// Ticket token (holder only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_token: Option<String>,
    /// Ticket expiry
    pub ticket_expires_at: DateTime<Utc>,
    /// Whether the ticket was used
    pub attended: bool,
    /// When the ticket was used
    pub attended_at: Option<DateTime<Utc>>,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl RegistrationResponse {
    fn new(registration: Registration, include_token: bool) -> Self {
        Self {
            id: *registration.id.as_uuid(),
            subject_id: *registration.subject_id.as_uuid(),
            event_id: *registration.event_id.as_uuid(),
            payment_state: registration.payment_state,
            payment_order_id: registration.payment_order_id,
            ticket_token: include_token.then_some(registration.ticket_token),
            ticket_expires_at: registration.ticket_expires_at,
            attended: registration.attended,
            attended_at: registration.attended_at,
            created_at: registration.created_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Register the caller for an event.
///
/// # Endpoint
///
/// ```text
/// POST /api/events/:event_id/registrations
/// ```
///
/// # Errors
///
/// - 404 `EVENT_NOT_FOUND` if the event is unknown in the caller's tenant
/// - 409 `ALREADY_REGISTERED` if the caller already holds a registration
/// - 502 / 504 if the payment provider fails or times out
/// - 503 if storage is unavailable
pub async fn register(
    identity: Identity,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let receipt = state
        .ledger
        .register(
            identity.subject_id,
            EventId::from_uuid(event_id),
            identity.tenant_id,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// List an event's registrations. Organizers and admins only.
///
/// # Endpoint
///
/// ```text
/// GET /api/events/:event_id/registrations
/// ```
///
/// # Errors
///
/// - 403 for members
/// - 404 `EVENT_NOT_FOUND` if the event is unknown in the caller's tenant
/// - 503 if storage is unavailable
pub async fn list_for_event(
    identity: Identity,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<Vec<RegistrationResponse>>, AppError> {
    identity.require_staff()?;

    let event_id = EventId::from_uuid(event_id);
    if !state.ledger.event_in_tenant(event_id, identity.tenant_id).await? {
        return Err(AppError::not_found("EVENT_NOT_FOUND", "Event not found"));
    }

    let registrations = state.ledger.list_for_event(event_id).await?;
    Ok(Json(
        registrations
            .into_iter()
            .map(|registration| RegistrationResponse::new(registration, false))
            .collect(),
    ))
}

/// The caller's own registrations, including their ticket tokens.
///
/// # Endpoint
///
/// ```text
/// GET /api/registrations/me
/// ```
///
/// # Errors
///
/// - 503 if storage is unavailable
pub async fn list_mine(
    identity: Identity,
    State(state): State<AppState>,
) -> Result<Json<Vec<RegistrationResponse>>, AppError> {
    let registrations = state.ledger.list_for_subject(identity.subject_id).await?;
    Ok(Json(
        registrations
            .into_iter()
            .filter(|registration| registration.tenant_id == identity.tenant_id)
            .map(|registration| RegistrationResponse::new(registration, true))
            .collect(),
    ))
}
