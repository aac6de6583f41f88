//! Router configuration.

use crate::handlers::{checkins, health, registrations, webhooks};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// - `/health`, `/ready` (no identity required)
/// - `/api/events/:event_id/registrations`
/// - `/api/registrations/me`
/// - `/api/check-ins`
/// - `/api/webhooks/payments` (authenticated by signature, not identity headers)
pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/events/:event_id/registrations",
            post(registrations::register).get(registrations::list_for_event),
        )
        .route("/registrations/me", get(registrations::list_mine))
        .route("/check-ins", post(checkins::check_in))
        .route("/webhooks/payments", post(webhooks::payment_webhook));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
