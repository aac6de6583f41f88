//! In-memory registration store.
//!
//! All trait operations take the single lock for their whole duration, which gives
//! the same atomicity the Postgres store gets from single-statement conditional updates.

use crate::store::{AttendanceUpdate, PaymentUpdate, RegistrationStore, StoreError};
use crate::types::{EventId, PaymentState, Registration, RegistrationId, SubjectId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock registration store.
///
/// Uses in-memory storage for testing. [`set_unavailable`](Self::set_unavailable)
/// makes every call fail with [`StoreError::Unavailable`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistrationStore {
    registrations: Arc<Mutex<HashMap<RegistrationId, Registration>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryRegistrationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage (or recovery).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.lock().map_or(0, |map| map.len())
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn guard(&self) -> Result<MutexGuard<'_, HashMap<RegistrationId, Registration>>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        self.registrations
            .lock()
            .map_err(|_| StoreError::Unavailable("registration store lock poisoned".to_string()))
    }
}

fn sorted_by_creation(mut registrations: Vec<Registration>) -> Vec<Registration> {
    registrations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    registrations
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrationStore {
    async fn insert(&self, registration: &Registration) -> Result<(), StoreError> {
        let mut registrations = self.guard()?;

        if registrations.values().any(|existing| {
            existing.subject_id == registration.subject_id
                && existing.event_id == registration.event_id
        }) {
            return Err(StoreError::Duplicate(format!(
                "subject {} already registered for event {}",
                registration.subject_id, registration.event_id
            )));
        }
        if registrations.contains_key(&registration.id)
            || registrations
                .values()
                .any(|existing| existing.ticket_token == registration.ticket_token)
        {
            return Err(StoreError::Duplicate(format!(
                "registration {} conflicts with an existing id or token",
                registration.id
            )));
        }

        registrations.insert(registration.id, registration.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: RegistrationId) -> Result<Option<Registration>, StoreError> {
        Ok(self.guard()?.get(&id).cloned())
    }

    async fn find_by_subject_and_event(
        &self,
        subject_id: SubjectId,
        event_id: EventId,
    ) -> Result<Option<Registration>, StoreError> {
        Ok(self
            .guard()?
            .values()
            .find(|r| r.subject_id == subject_id && r.event_id == event_id)
            .cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Registration>, StoreError> {
        Ok(self
            .guard()?
            .values()
            .find(|r| r.ticket_token == token)
            .cloned())
    }

    async fn apply_payment_state(
        &self,
        order_id: &str,
        target: PaymentState,
        _updated_at: DateTime<Utc>,
    ) -> Result<PaymentUpdate, StoreError> {
        let mut registrations = self.guard()?;
        let allowed_from = target.reconcilable_from();

        let mut matched = false;
        let mut updated = 0;
        for registration in registrations
            .values_mut()
            .filter(|r| r.payment_order_id.as_deref() == Some(order_id))
        {
            matched = true;
            if allowed_from.contains(&registration.payment_state) {
                registration.payment_state = target;
                updated += 1;
            }
        }

        Ok(match (matched, updated) {
            (false, _) => PaymentUpdate::UnknownOrder,
            (true, 0) => PaymentUpdate::Unchanged,
            (true, count) => PaymentUpdate::Updated(count),
        })
    }

    async fn mark_attended(
        &self,
        id: RegistrationId,
        scanner: SubjectId,
        at: DateTime<Utc>,
    ) -> Result<AttendanceUpdate, StoreError> {
        let mut registrations = self.guard()?;
        let Some(registration) = registrations.get_mut(&id) else {
            return Ok(AttendanceUpdate::NotFound);
        };

        if registration.attended {
            return Ok(AttendanceUpdate::AlreadyCheckedIn);
        }
        if registration.payment_state != PaymentState::Paid {
            return Ok(AttendanceUpdate::PaymentIncomplete(registration.payment_state));
        }

        registration.attended = true;
        registration.attended_at = Some(at.max(registration.created_at));
        registration.attended_by = Some(scanner);
        Ok(AttendanceUpdate::CheckedIn(registration.clone()))
    }

    async fn list_for_event(&self, event_id: EventId) -> Result<Vec<Registration>, StoreError> {
        let matching = self
            .guard()?
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(matching))
    }

    async fn list_for_subject(
        &self,
        subject_id: SubjectId,
    ) -> Result<Vec<Registration>, StoreError> {
        let matching = self
            .guard()?
            .values()
            .filter(|r| r.subject_id == subject_id)
            .cloned()
            .collect();
        Ok(sorted_by_creation(matching))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.guard().map(|_| ())
    }
}
