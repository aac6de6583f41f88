//! In-memory event catalog.

use crate::store::{EventCatalog, StoreError};
use crate::types::{EventId, EventListing, Money, TenantId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock event catalog backed by a `HashMap`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventCatalog {
    events: Arc<Mutex<HashMap<EventId, EventListing>>>,
}

impl InMemoryEventCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an event listing.
    pub fn insert(&self, listing: EventListing) {
        if let Ok(mut events) = self.events.lock() {
            events.insert(listing.event_id, listing);
        }
    }

    /// Add a free event owned by `tenant_id` and return its id.
    #[must_use]
    pub fn add_free_event(&self, tenant_id: TenantId) -> EventId {
        let event_id = EventId::new();
        self.insert(EventListing {
            event_id,
            tenant_id,
            price: None,
        });
        event_id
    }

    /// Add a priced event owned by `tenant_id` and return its id.
    #[must_use]
    pub fn add_paid_event(&self, tenant_id: TenantId, price: Money) -> EventId {
        let event_id = EventId::new();
        self.insert(EventListing {
            event_id,
            tenant_id,
            price: Some(price),
        });
        event_id
    }
}

#[async_trait]
impl EventCatalog for InMemoryEventCatalog {
    async fn find_event(&self, event_id: EventId) -> Result<Option<EventListing>, StoreError> {
        let events = self
            .events
            .lock()
            .map_err(|_| StoreError::Unavailable("event catalog lock poisoned".to_string()))?;
        Ok(events.get(&event_id).cloned())
    }
}
