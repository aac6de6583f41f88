//! Door check-in endpoint.

use crate::error::AppError;
use crate::extractors::Identity;
use crate::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Scanned ticket.
#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    /// Ticket token as presented
    pub token: String,
}

/// Successful admission.
#[derive(Debug, Serialize)]
pub struct CheckInResponse {
    /// Admitted registration
    pub registration_id: Uuid,
    /// Always `"checked_in"`
    pub outcome: &'static str,
}

/// Admit a ticket holder. The caller is the scanner and must be staff.
///
/// # Endpoint
///
/// ```text
/// POST /api/check-ins
/// {"token": "..."}
/// ```
///
/// # Errors
///
/// - 400 if the body is not `{"token": string}`
/// - 403 for members
/// - 422 `INVALID_TOKEN`, 404 `NOT_FOUND`, 409 `ALREADY_CHECKED_IN`,
///   402 `PAYMENT_INCOMPLETE`
/// - 503 if storage is unavailable
pub async fn check_in(
    identity: Identity,
    State(state): State<AppState>,
    body: Result<Json<CheckInRequest>, JsonRejection>,
) -> Result<Json<CheckInResponse>, AppError> {
    identity.require_staff()?;
    let Json(request) = body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let registration_id = state
        .check_in
        .check_in(&request.token, identity.subject_id, identity.tenant_id)
        .await?;

    Ok(Json(CheckInResponse {
        registration_id: *registration_id.as_uuid(),
        outcome: "checked_in",
    }))
}
