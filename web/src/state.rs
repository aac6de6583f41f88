//! Application state for Axum handlers.

use gatepass_core::{CheckInProcessor, RegistrationLedger, RegistrationStore, WebhookReconciler};
use std::sync::Arc;

/// Services shared across all HTTP handlers.
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Response>, AppError> {
///     let receipt = state.ledger.register(subject, event, tenant).await?;
///     Ok(Json(receipt.into()))
/// }
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Registration and payment bookkeeping
    pub ledger: Arc<RegistrationLedger>,
    /// Door check-in
    pub check_in: Arc<CheckInProcessor>,
    /// Payment provider webhooks
    pub webhooks: Arc<WebhookReconciler>,
    /// Backing store, for readiness probes
    pub store: Arc<dyn RegistrationStore>,
}

impl AppState {
    /// Bundle the services.
    #[must_use]
    pub fn new(
        ledger: Arc<RegistrationLedger>,
        check_in: Arc<CheckInProcessor>,
        webhooks: Arc<WebhookReconciler>,
        store: Arc<dyn RegistrationStore>,
    ) -> Self {
        Self {
            ledger,
            check_in,
            webhooks,
            store,
        }
    }
}
