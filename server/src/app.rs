//! Service assembly.

use crate::config::Config;
use gatepass_core::environment::Clock;
use gatepass_core::{
    CheckInProcessor, EmptyWebhookSecret, EventCatalog, LedgerSettings, PaymentOrderGateway,
    RegistrationLedger, RegistrationStore, TokenCodec, TokenCodecError, WebhookReconciler,
};
use gatepass_web::AppState;
use std::sync::Arc;
use thiserror::Error;

/// Services could not be built from the configuration.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Ticket signing secret rejected.
    #[error(transparent)]
    TokenCodec(#[from] TokenCodecError),
    /// Webhook secret rejected.
    #[error(transparent)]
    WebhookSecret(#[from] EmptyWebhookSecret),
}

/// Wire the core services together over the given adapters.
///
/// # Errors
///
/// Returns [`StartupError`] if either secret is unusable.
pub fn build_state(
    config: &Config,
    store: Arc<dyn RegistrationStore>,
    catalog: Arc<dyn EventCatalog>,
    gateway: Arc<dyn PaymentOrderGateway>,
    clock: Arc<dyn Clock>,
) -> Result<AppState, StartupError> {
    let codec = Arc::new(TokenCodec::new(
        config.tickets.signing_secret.expose(),
        clock.clone(),
    )?);

    let ledger = Arc::new(RegistrationLedger::new(
        store.clone(),
        catalog,
        gateway,
        codec.clone(),
        clock.clone(),
        LedgerSettings {
            ticket_ttl: config.ticket_ttl(),
            order_timeout: config.order_timeout(),
        },
    ));
    let check_in = Arc::new(CheckInProcessor::new(store.clone(), codec, clock));
    let webhooks = Arc::new(WebhookReconciler::new(
        ledger.clone(),
        config.payments.webhook_secret.expose(),
    )?);

    Ok(AppState::new(ledger, check_in, webhooks, store))
}
