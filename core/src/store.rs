//! Persistence contracts.
//!
//! The registration store is the only shared mutable state in the subsystem, so it
//! carries the correctness burden:
//!
//! - **Uniqueness**: at most one registration per `(subject, event)`; a losing
//!   concurrent insert fails with [`StoreError::Duplicate`].
//! - **Conditional writes**: payment and attendance changes are single
//!   compare-and-swap operations scoped to the record's prior state. Never
//!   read-then-write.

use crate::types::{
    EventId, EventListing, PaymentState, Registration, RegistrationId, SubjectId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate registration: {0}")]
    Duplicate(String),
    /// The store could not be reached or the query failed.
    #[error("registration store unavailable: {0}")]
    Unavailable(String),
    /// A stored row could not be decoded.
    #[error("corrupt registration record: {0}")]
    Corrupt(String),
}

/// Result of a conditional payment-state update for one order id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentUpdate {
    /// This many registrations moved to the target state.
    Updated(u64),
    /// Registrations exist for the order but were already settled (or terminal).
    Unchanged,
    /// No registration references the order.
    UnknownOrder,
}

/// Result of the conditional attendance write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttendanceUpdate {
    /// The write won; the record as it is now.
    CheckedIn(Registration),
    /// The record was already attended.
    AlreadyCheckedIn,
    /// The record is unattended but not paid.
    PaymentIncomplete(PaymentState),
    /// No record with that id.
    NotFound,
}

/// Registration persistence.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Insert a new registration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if a registration for the same subject and
    /// event (or the same ticket token) already exists.
    async fn insert(&self, registration: &Registration) -> Result<(), StoreError>;

    /// Get a registration by id.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    async fn find_by_id(&self, id: RegistrationId) -> Result<Option<Registration>, StoreError>;

    /// Get the registration for a subject and event.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    async fn find_by_subject_and_event(
        &self,
        subject_id: SubjectId,
        event_id: EventId,
    ) -> Result<Option<Registration>, StoreError>;

    /// Get the registration whose stored ticket token equals `token`.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    async fn find_by_token(&self, token: &str) -> Result<Option<Registration>, StoreError>;

    /// Move every registration referencing `order_id` to `target`, but only those
    /// currently in one of [`PaymentState::reconcilable_from`] for `target`.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be updated.
    async fn apply_payment_state(
        &self,
        order_id: &str,
        target: PaymentState,
        updated_at: DateTime<Utc>,
    ) -> Result<PaymentUpdate, StoreError>;

    /// Atomically flip `attended` to true, recording `scanner` and `at`, only if the
    /// record is currently unattended **and** paid.
    ///
    /// `attended_at` is clamped to be no earlier than the record's creation time.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be updated.
    async fn mark_attended(
        &self,
        id: RegistrationId,
        scanner: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<AttendanceUpdate, StoreError>;

    /// Registrations for an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    async fn list_for_event(&self, event_id: EventId) -> Result<Vec<Registration>, StoreError>;

    /// Registrations held by a subject, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    async fn list_for_subject(&self, subject_id: SubjectId)
    -> Result<Vec<Registration>, StoreError>;

    /// Cheap connectivity check for readiness probes.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be reached.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Read-only event lookup provided by the event-management layer.
#[async_trait]
pub trait EventCatalog: Send + Sync {
    /// Look up an event's tenant and price.
    ///
    /// # Errors
    ///
    /// Returns error if the catalog cannot be queried.
    async fn find_event(&self, event_id: EventId) -> Result<Option<EventListing>, StoreError>;
}
