//! Core of the Gatepass registration and check-in subsystem.
//!
//! Gatepass issues a signed, time-limited ticket token when a subject registers
//! for an event, optionally coordinates with an external payment gateway, and later
//! admits the ticket holder exactly once, even when several scanners present the
//! same token at the same moment.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────┐
//!   register ───▶ │  RegistrationLedger  │ ───▶ PaymentOrderGateway (external)
//!                 └──────────────────────┘
//!                      │            ▲
//!                 mint │            │ apply_payment_outcome
//!                      ▼            │
//!                 ┌──────────┐  ┌───────────────────┐
//!                 │  Token   │  │ WebhookReconciler │ ◀─── signed provider webhook
//!                 │  Codec   │  └───────────────────┘
//!                 └──────────┘
//!                      ▲ verify
//!                      │
//!   check_in ───▶ ┌──────────────────┐
//!                 │ CheckInProcessor │ ───▶ conditional write (attended: false → true)
//!                 └──────────────────┘
//!                      │
//!                      ▼
//!                 RegistrationStore (atomic conditional updates + uniqueness)
//! ```
//!
//! # Concurrency model
//!
//! There is no in-process shared mutable state beyond the [`store::RegistrationStore`].
//! Every mutation is a compare-and-swap against the record's prior state, so concurrent
//! request handlers converge without locks:
//!
//! - one persisted registration per `(subject, event)`, enforced by a uniqueness constraint
//! - payment state only moves along [`types::PaymentState::reconcilable_from`]
//! - attendance flips `false → true` only while the record is unattended **and** paid
//!
//! # Example
//!
//! ```ignore
//! let ledger = RegistrationLedger::new(
//!     store.clone(),
//!     catalog,
//!     gateway,
//!     codec.clone(),
//!     clock.clone(),
//!     settings,
//! );
//! let receipt = ledger.register(subject_id, event_id, tenant_id).await?;
//!
//! let processor = CheckInProcessor::new(store, codec, clock);
//! let token = &receipt.registration.ticket_token;
//! let registration_id = processor.check_in(token, scanner_id, tenant_id).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checkin;
pub mod gateway;
pub mod ledger;
pub mod signature;
pub mod store;
pub mod telemetry;
pub mod token;
pub mod types;
pub mod webhook;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use checkin::{CheckInError, CheckInProcessor};
pub use gateway::{GatewayError, OrderRequest, PaymentOrder, PaymentOrderGateway};
pub use ledger::{LedgerSettings, RegistrationError, RegistrationLedger, RegistrationReceipt};
pub use store::{AttendanceUpdate, EventCatalog, PaymentUpdate, RegistrationStore, StoreError};
pub use token::{InvalidToken, MintedTicket, TokenCodec, TokenCodecError};
pub use types::*;
pub use webhook::{EmptyWebhookSecret, WebhookDisposition, WebhookError, WebhookReconciler};

/// Environment abstractions - injected dependencies that are not storage.
///
/// All time reads go through a [`Clock`](environment::Clock) so token expiry
/// and attendance timestamps are deterministic in tests.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use gatepass_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = chrono::Utc::now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time from the operating system.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
