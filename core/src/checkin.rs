//! Door check-in.
//!
//! The token proves *who* and *which event*; the store decides *whether* the holder
//! may enter. Admission is a single conditional write, so two scanners presenting
//! the same token at the same instant produce exactly one success.

use crate::environment::Clock;
use crate::store::{AttendanceUpdate, RegistrationStore, StoreError};
use crate::telemetry;
use crate::token::TokenCodec;
use crate::types::{PaymentState, RegistrationId, SubjectId, TenantId};
use std::sync::Arc;
use thiserror::Error;

/// Check-in rejections.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckInError {
    /// Token failed verification (malformed, forged or expired).
    #[error("invalid ticket")]
    InvalidToken,
    /// No registration holds this token.
    #[error("registration not found")]
    NotFound,
    /// The ticket was already used.
    #[error("ticket already used")]
    AlreadyCheckedIn,
    /// The registration is not paid.
    #[error("payment incomplete ({state})")]
    PaymentIncomplete {
        /// Current payment state
        state: PaymentState,
    },
    /// The store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl CheckInError {
    /// Short outcome label for logs and metrics.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::NotFound => "not_found",
            Self::AlreadyCheckedIn => "already_checked_in",
            Self::PaymentIncomplete { .. } => "payment_incomplete",
            Self::Storage(_) => "storage_error",
        }
    }
}

/// Verifies presented tickets and records attendance.
#[derive(Clone)]
pub struct CheckInProcessor {
    store: Arc<dyn RegistrationStore>,
    codec: Arc<TokenCodec>,
    clock: Arc<dyn Clock>,
}

impl CheckInProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        codec: Arc<TokenCodec>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            codec,
            clock,
        }
    }

    /// Admit the holder of `token`, scanned by `scanner_id` acting in `scanner_tenant`.
    ///
    /// # Errors
    ///
    /// - [`CheckInError::InvalidToken`] if the token does not verify
    /// - [`CheckInError::NotFound`] if no registration holds the token, the holder
    ///   disagrees with the token's claims, or the registration belongs to another
    ///   tenant
    /// - [`CheckInError::AlreadyCheckedIn`] if the ticket was used before, including
    ///   by a concurrent scan that won the write
    /// - [`CheckInError::PaymentIncomplete`] if the registration is not `PAID`
    /// - [`CheckInError::Storage`] on store failures
    #[tracing::instrument(
        skip_all,
        fields(scanner_id = %scanner_id, scanner_tenant = %scanner_tenant)
    )]
    pub async fn check_in(
        &self,
        token: &str,
        scanner_id: SubjectId,
        scanner_tenant: TenantId,
    ) -> Result<RegistrationId, CheckInError> {
        let result = self.admit(token, scanner_id, scanner_tenant).await;
        match &result {
            Ok(registration_id) => {
                telemetry::record_check_in("checked_in");
                tracing::info!(registration_id = %registration_id, "Ticket checked in");
            }
            Err(error) => {
                telemetry::record_check_in(error.outcome());
                tracing::info!(outcome = error.outcome(), "Check-in rejected");
            }
        }
        result
    }

    async fn admit(
        &self,
        token: &str,
        scanner_id: SubjectId,
        scanner_tenant: TenantId,
    ) -> Result<RegistrationId, CheckInError> {
        let claims = self
            .codec
            .verify(token)
            .map_err(|_| CheckInError::InvalidToken)?;

        let registration = self
            .store
            .find_by_token(token)
            .await?
            .ok_or(CheckInError::NotFound)?;

        if registration.subject_id != claims.subject_id || registration.event_id != claims.event_id
        {
            tracing::warn!(
                target: "gatepass::security",
                registration_id = %registration.id,
                "Stored registration disagrees with verified ticket claims"
            );
            return Err(CheckInError::NotFound);
        }

        // Tenant is fixed at registration, so checking it before the write is enough.
        if registration.tenant_id != scanner_tenant {
            tracing::warn!(
                target: "gatepass::security",
                registration_id = %registration.id,
                "Ticket scanned by staff of another tenant"
            );
            return Err(CheckInError::NotFound);
        }

        match self
            .store
            .mark_attended(registration.id, scanner_id, self.clock.now())
            .await?
        {
            AttendanceUpdate::CheckedIn(updated) => Ok(updated.id),
            AttendanceUpdate::AlreadyCheckedIn => Err(CheckInError::AlreadyCheckedIn),
            AttendanceUpdate::PaymentIncomplete(state) => {
                Err(CheckInError::PaymentIncomplete { state })
            }
            AttendanceUpdate::NotFound => Err(CheckInError::NotFound),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mocks::{FixedClock, InMemoryRegistrationStore, test_clock};
    use crate::types::{EventId, Registration};
    use chrono::Duration;

    const SECRET: &str = "checkin-test-signing-secret-0123456789";

    struct Fixture {
        processor: CheckInProcessor,
        store: InMemoryRegistrationStore,
        codec: Arc<TokenCodec>,
        clock: FixedClock,
        tenant: TenantId,
    }

    fn fixture() -> Fixture {
        let clock = test_clock();
        let store = InMemoryRegistrationStore::new();
        let codec =
            Arc::new(TokenCodec::new(SECRET, Arc::new(clock.clone())).expect("valid secret"));
        let processor =
            CheckInProcessor::new(Arc::new(store.clone()), codec.clone(), Arc::new(clock.clone()));
        Fixture {
            processor,
            store,
            codec,
            clock,
            tenant: TenantId::new(),
        }
    }

    impl Fixture {
        async fn scan(&self, token: &str) -> Result<RegistrationId, CheckInError> {
            self.processor.check_in(token, SubjectId::new(), self.tenant).await
        }
    }

    async fn seed(f: &Fixture, state: PaymentState) -> Registration {
        let subject_id = SubjectId::new();
        let event_id = EventId::new();
        let ticket = f.codec.mint(subject_id, event_id, Duration::hours(12));
        let registration = Registration {
            id: RegistrationId::new(),
            subject_id,
            event_id,
            tenant_id: f.tenant,
            payment_state: state,
            payment_order_id: None,
            amount: None,
            ticket_token: ticket.token,
            ticket_expires_at: ticket.expires_at,
            attended: false,
            attended_at: None,
            attended_by: None,
            created_at: f.clock.now(),
        };
        f.store.insert(&registration).await.unwrap();
        registration
    }

    #[tokio::test]
    async fn test_paid_ticket_checks_in_once() {
        let f = fixture();
        let registration = seed(&f, PaymentState::Paid).await;
        let scanner = SubjectId::new();
        f.clock.advance(Duration::hours(1));

        let first = f.processor.check_in(&registration.ticket_token, scanner, f.tenant).await;
        let second = f.processor.check_in(&registration.ticket_token, scanner, f.tenant).await;

        assert_eq!(first, Ok(registration.id));
        assert_eq!(second, Err(CheckInError::AlreadyCheckedIn));

        let stored = f.store.find_by_id(registration.id).await.unwrap().unwrap();
        assert!(stored.attended);
        assert_eq!(stored.attended_by, Some(scanner));
        assert_eq!(
            stored.attended_at,
            Some(registration.created_at + Duration::hours(1))
        );
    }

    #[tokio::test]
    async fn test_pending_ticket_is_payment_incomplete() {
        let f = fixture();
        let registration = seed(&f, PaymentState::Pending).await;

        let result = f.scan(&registration.ticket_token).await;

        assert_eq!(
            result,
            Err(CheckInError::PaymentIncomplete {
                state: PaymentState::Pending
            })
        );
        assert!(!f.store.find_by_id(registration.id).await.unwrap().unwrap().attended);
    }

    #[tokio::test]
    async fn test_expired_ticket_is_invalid() {
        let f = fixture();
        let registration = seed(&f, PaymentState::Paid).await;
        f.clock.advance(Duration::hours(12));

        let result = f.scan(&registration.ticket_token).await;

        assert_eq!(result, Err(CheckInError::InvalidToken));
    }

    #[tokio::test]
    async fn test_valid_token_without_registration_not_found() {
        let f = fixture();
        let orphan = f.codec.mint(SubjectId::new(), EventId::new(), Duration::hours(1));

        let result = f.scan(&orphan.token).await;

        assert_eq!(result, Err(CheckInError::NotFound));
    }

    #[tokio::test]
    async fn test_garbage_token_is_invalid() {
        let f = fixture();
        let result = f.scan("definitely-not-a-ticket").await;
        assert_eq!(result, Err(CheckInError::InvalidToken));
    }

    #[tokio::test]
    async fn test_claims_must_match_stored_record() {
        let f = fixture();
        let mut registration = seed(&f, PaymentState::Paid).await;
        // A different token stored against someone else's registration.
        let foreign = f.codec.mint(SubjectId::new(), registration.event_id, Duration::hours(1));
        registration.id = RegistrationId::new();
        registration.subject_id = SubjectId::new();
        registration.ticket_token = foreign.token.clone();
        f.store.insert(&registration).await.unwrap();

        let stored_subject = registration.subject_id;
        let result = f.scan(&foreign.token).await;

        assert_ne!(stored_subject, f.codec.verify(&foreign.token).unwrap().subject_id);
        assert_eq!(result, Err(CheckInError::NotFound));
    }

    #[tokio::test]
    async fn test_storage_outage_is_reported() {
        let f = fixture();
        let registration = seed(&f, PaymentState::Paid).await;
        f.store.set_unavailable(true);

        let result = f.scan(&registration.ticket_token).await;

        assert!(matches!(
            result,
            Err(CheckInError::Storage(StoreError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_other_tenant_cannot_use_ticket() {
        let f = fixture();
        let registration = seed(&f, PaymentState::Paid).await;

        let foreign = f
            .processor
            .check_in(&registration.ticket_token, SubjectId::new(), TenantId::new())
            .await;
        assert_eq!(foreign, Err(CheckInError::NotFound));
        assert!(!f.store.find_by_id(registration.id).await.unwrap().unwrap().attended);

        assert_eq!(f.scan(&registration.ticket_token).await, Ok(registration.id));
    }
}
