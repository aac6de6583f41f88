//! Registration ledger: creates registrations and applies payment outcomes.
//!
//! Registration is the only flow that talks to the payment gateway. The order is
//! created *before* anything is persisted, so a gateway failure leaves no trace. The
//! converse is not true: if persistence fails after the order exists, the order is
//! orphaned at the provider. That case is logged with the order id for manual
//! follow-up and never cancelled automatically.

use crate::environment::Clock;
use crate::gateway::{GatewayError, OrderRequest, PaymentOrder, PaymentOrderGateway};
use crate::store::{EventCatalog, PaymentUpdate, RegistrationStore, StoreError};
use crate::telemetry;
use crate::token::TokenCodec;
use crate::types::{
    EventId, PaymentOutcome, PaymentState, Registration, RegistrationId, SubjectId, TenantId,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Registration failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The subject already holds a registration for this event.
    #[error("already registered for this event")]
    AlreadyRegistered,
    /// The event does not exist (or belongs to another tenant).
    #[error("event not found")]
    EventNotFound,
    /// Payment order creation failed; nothing was persisted.
    #[error("payment gateway error: {0}")]
    PaymentGateway(#[from] GatewayError),
    /// The registration store failed.
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Duplicate(_) => Self::AlreadyRegistered,
            other => Self::Storage(other),
        }
    }
}

/// Tunables for the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    /// How long minted tickets stay valid
    pub ticket_ttl: chrono::Duration,
    /// Upper bound on a single gateway order call
    pub order_timeout: Duration,
}

impl LedgerSettings {
    /// Default ticket validity (12 hours)
    pub const DEFAULT_TICKET_TTL_SECS: i64 = 12 * 60 * 60;
    /// Default gateway order timeout (10 seconds)
    pub const DEFAULT_ORDER_TIMEOUT_SECS: u64 = 10;
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            ticket_ttl: chrono::Duration::seconds(Self::DEFAULT_TICKET_TTL_SECS),
            order_timeout: Duration::from_secs(Self::DEFAULT_ORDER_TIMEOUT_SECS),
        }
    }
}

/// A successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationReceipt {
    /// The persisted registration
    pub registration: Registration,
    /// The gateway order to pay, for priced events
    pub payment_order: Option<PaymentOrder>,
}

/// Creates registrations and applies payment outcomes.
#[derive(Clone)]
pub struct RegistrationLedger {
    store: Arc<dyn RegistrationStore>,
    catalog: Arc<dyn EventCatalog>,
    gateway: Arc<dyn PaymentOrderGateway>,
    codec: Arc<TokenCodec>,
    clock: Arc<dyn Clock>,
    settings: LedgerSettings,
}

impl RegistrationLedger {
    /// Creates a ledger over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        catalog: Arc<dyn EventCatalog>,
        gateway: Arc<dyn PaymentOrderGateway>,
        codec: Arc<TokenCodec>,
        clock: Arc<dyn Clock>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            gateway,
            codec,
            clock,
            settings,
        }
    }

    /// Register `subject_id` (acting within `tenant_id`) for `event_id`.
    ///
    /// Free events are `PAID` immediately. Priced events get a gateway order and
    /// start `PENDING`.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::EventNotFound`] if the event is unknown or owned by
    ///   another tenant
    /// - [`RegistrationError::AlreadyRegistered`] if the subject already holds a
    ///   registration, including when a concurrent request won the insert
    /// - [`RegistrationError::PaymentGateway`] if order creation fails or times out
    /// - [`RegistrationError::Storage`] on store failures
    #[tracing::instrument(
        skip_all,
        fields(subject_id = %subject_id, event_id = %event_id, tenant_id = %tenant_id)
    )]
    pub async fn register(
        &self,
        subject_id: SubjectId,
        event_id: EventId,
        tenant_id: TenantId,
    ) -> Result<RegistrationReceipt, RegistrationError> {
        let result = self.try_register(subject_id, event_id, tenant_id).await;
        telemetry::record_registration(match &result {
            Ok(receipt) if receipt.payment_order.is_some() => "pending_payment",
            Ok(_) => "free",
            Err(RegistrationError::AlreadyRegistered) => "already_registered",
            Err(RegistrationError::EventNotFound) => "event_not_found",
            Err(RegistrationError::PaymentGateway(_)) => "gateway_error",
            Err(RegistrationError::Storage(_)) => "storage_error",
        });
        result
    }

    async fn try_register(
        &self,
        subject_id: SubjectId,
        event_id: EventId,
        tenant_id: TenantId,
    ) -> Result<RegistrationReceipt, RegistrationError> {
        let listing = self
            .catalog
            .find_event(event_id)
            .await?
            .filter(|listing| listing.tenant_id == tenant_id)
            .ok_or(RegistrationError::EventNotFound)?;

        if self
            .store
            .find_by_subject_and_event(subject_id, event_id)
            .await?
            .is_some()
        {
            return Err(RegistrationError::AlreadyRegistered);
        }

        let registration_id = RegistrationId::new();
        let payment_order = match listing.amount_due() {
            Some(amount) => Some(
                self.create_order(OrderRequest {
                    amount: amount.clone(),
                    reference: registration_id.to_string(),
                })
                .await?,
            ),
            None => None,
        };

        let ticket = self
            .codec
            .mint(subject_id, event_id, self.settings.ticket_ttl);
        let registration = Registration {
            id: registration_id,
            subject_id,
            event_id,
            tenant_id,
            payment_state: if payment_order.is_some() {
                PaymentState::Pending
            } else {
                PaymentState::Paid
            },
            payment_order_id: payment_order.as_ref().map(|order| order.order_id.clone()),
            amount: payment_order.as_ref().map(|order| order.amount.clone()),
            ticket_token: ticket.token,
            ticket_expires_at: ticket.expires_at,
            attended: false,
            attended_at: None,
            attended_by: None,
            created_at: self.clock.now(),
        };

        if let Err(error) = self.store.insert(&registration).await {
            if let Some(order) = &payment_order {
                tracing::error!(
                    registration_id = %registration_id,
                    order_id = %order.order_id,
                    error = %error,
                    "Registration not persisted after payment order creation; order is orphaned"
                );
            }
            return Err(error.into());
        }

        tracing::info!(
            registration_id = %registration.id,
            payment_state = %registration.payment_state,
            order_id = registration.payment_order_id.as_deref().unwrap_or(""),
            "Registration created"
        );

        Ok(RegistrationReceipt {
            registration,
            payment_order,
        })
    }

    async fn create_order(&self, request: OrderRequest) -> Result<PaymentOrder, GatewayError> {
        let started = Instant::now();
        let result = tokio::time::timeout(
            self.settings.order_timeout,
            self.gateway.create_order(&request),
        )
        .await
        .unwrap_or(Err(GatewayError::Timeout));
        telemetry::record_order_duration(started.elapsed().as_secs_f64());

        if let Err(error) = &result {
            tracing::warn!(
                reference = %request.reference,
                amount = request.amount.minor_units,
                error = %error,
                "Payment order creation failed"
            );
        }
        result
    }

    /// Settle every registration referencing `order_id` according to `outcome`.
    ///
    /// Idempotent: repeating an outcome, or delivering a failure after a capture, is
    /// reported as [`PaymentUpdate::Unchanged`]. Unknown orders are
    /// [`PaymentUpdate::UnknownOrder`]. Attendance is never touched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be updated.
    #[tracing::instrument(skip(self))]
    pub async fn apply_payment_outcome(
        &self,
        order_id: &str,
        outcome: PaymentOutcome,
    ) -> Result<PaymentUpdate, StoreError> {
        let target = outcome.target_state();
        let update = self
            .store
            .apply_payment_state(order_id, target, self.clock.now())
            .await?;

        match update {
            PaymentUpdate::Updated(count) => {
                telemetry::record_payment_outcome(target.as_str(), count);
                tracing::info!(count, state = %target, "Payment state updated");
            }
            PaymentUpdate::Unchanged => {
                tracing::debug!(state = %target, "Payment outcome already applied or superseded");
            }
            PaymentUpdate::UnknownOrder => {
                tracing::info!(state = %target, "Payment outcome for unknown order ignored");
            }
        }
        Ok(update)
    }

    /// Registrations for an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried.
    pub async fn list_for_event(&self, event_id: EventId) -> Result<Vec<Registration>, StoreError> {
        self.store.list_for_event(event_id).await
    }

    /// Registrations held by a subject, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried.
    pub async fn list_for_subject(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Registration>, StoreError> {
        self.store.list_for_subject(subject_id).await
    }

    /// Whether an event exists within `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the catalog cannot be queried.
    pub async fn event_in_tenant(
        &self,
        event_id: EventId,
        tenant_id: TenantId,
    ) -> Result<bool, StoreError> {
        Ok(self
            .catalog
            .find_event(event_id)
            .await?
            .is_some_and(|listing| listing.tenant_id == tenant_id))
    }
}
