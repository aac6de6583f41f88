//! Domain types for registration and check-in.
//!
//! Identifiers, money, payment state, and the [`Registration`] record itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// Identity of a user, as supplied by the upstream auth layer.
    ///
    /// Scanners are subjects too; `attended_by` records the scanning subject.
    SubjectId
);

uuid_identifier!(
    /// Unique identifier for an event
    EventId
);

uuid_identifier!(
    /// Tenant (college) that owns an event.
    TenantId
);

uuid_identifier!(
    /// Unique identifier for a registration
    RegistrationId
);

// ============================================================================
// Money
// ============================================================================

/// Currency code could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid currency code: {0:?}")]
pub struct InvalidCurrency(pub String);

/// ISO 4217 currency code (three uppercase ASCII letters).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// The currency code, e.g. `"INR"`.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.0
    }
}

impl FromStr for Currency {
    type Err = InvalidCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == 3 && s.bytes().all(|b| b.is_ascii_alphabetic()) {
            Ok(Self(s.to_ascii_uppercase()))
        } else {
            Err(InvalidCurrency(s.to_string()))
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = InvalidCurrency;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An amount in the smallest unit of its currency (paise, cents).
///
/// Integer minor units keep gateway amounts free of floating-point rounding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units
    pub minor_units: u64,
    /// Currency of the amount
    pub currency: Currency,
}

impl Money {
    /// Creates an amount from minor units.
    #[must_use]
    pub const fn new(minor_units: u64, currency: Currency) -> Self {
        Self {
            minor_units,
            currency,
        }
    }

    /// Whether the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.minor_units == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.minor_units, self.currency)
    }
}

// ============================================================================
// Payment state
// ============================================================================

/// Payment state of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    /// No payment recorded
    None,
    /// Order created, waiting for the provider's outcome
    Pending,
    /// Payment captured (free events start here)
    Paid,
    /// Provider reported a failed payment attempt
    Failed,
}

impl PaymentState {
    /// Convert state to its storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        }
    }

    /// Parse state from its storage representation.
    ///
    /// # Errors
    ///
    /// Returns the unrecognised input if it is not a known state.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "NONE" => Ok(Self::None),
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            other => Err(other.to_string()),
        }
    }

    /// States a webhook outcome may move a registration *from* when the target is `self`.
    ///
    /// `PAID` is terminal for reconciliation: a late failure for an earlier attempt
    /// never revokes a captured payment. A failed attempt may still be followed by a
    /// successful one on the same order.
    #[must_use]
    pub const fn reconcilable_from(&self) -> &'static [Self] {
        match self {
            Self::Paid => &[Self::Pending, Self::Failed],
            Self::Failed => &[Self::Pending],
            Self::None | Self::Pending => &[],
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a payment attempt, as reported by the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentOutcome {
    /// Payment captured
    Succeeded,
    /// Payment attempt failed
    Failed,
}

impl PaymentOutcome {
    /// The payment state this outcome settles a registration into.
    #[must_use]
    pub const fn target_state(self) -> PaymentState {
        match self {
            Self::Succeeded => PaymentState::Paid,
            Self::Failed => PaymentState::Failed,
        }
    }
}

// ============================================================================
// Events (external)
// ============================================================================

/// What this subsystem needs to know about an event owned by the CRUD layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventListing {
    /// Event id
    pub event_id: EventId,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Ticket price; `None` for free events
    pub price: Option<Money>,
}

impl EventListing {
    /// Amount a registrant owes, or `None` when the event is free.
    ///
    /// A zero price counts as free.
    #[must_use]
    pub fn amount_due(&self) -> Option<&Money> {
        self.price.as_ref().filter(|price| !price.is_zero())
    }
}

// ============================================================================
// Registrations
// ============================================================================

/// One subject's claim on one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration id
    pub id: RegistrationId,
    /// Registered subject
    pub subject_id: SubjectId,
    /// Event registered for
    pub event_id: EventId,
    /// Tenant owning the event
    pub tenant_id: TenantId,
    /// Payment state
    pub payment_state: PaymentState,
    /// Gateway order reference (paid events only)
    pub payment_order_id: Option<String>,
    /// Amount due (paid events only)
    pub amount: Option<Money>,
    /// Signed ticket token; immutable once minted
    pub ticket_token: String,
    /// When the ticket token stops verifying
    pub ticket_expires_at: DateTime<Utc>,
    /// Whether the ticket has been used at the door
    pub attended: bool,
    /// When the ticket was scanned
    pub attended_at: Option<DateTime<Utc>>,
    /// Who scanned the ticket
    pub attended_by: Option<SubjectId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Claims carried by a verified ticket token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TicketClaims {
    /// Bound subject
    pub subject_id: SubjectId,
    /// Bound event
    pub event_id: EventId,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_normalizes_case() {
        let currency: Currency = "inr".parse().unwrap();
        assert_eq!(currency.code(), "INR");
    }

    #[test]
    fn test_currency_rejects_bad_codes() {
        assert!("RUPEE".parse::<Currency>().is_err());
        assert!("I1R".parse::<Currency>().is_err());
        assert!("".parse::<Currency>().is_err());
    }

    #[test]
    fn test_zero_price_is_free() {
        let listing = EventListing {
            event_id: EventId::new(),
            tenant_id: TenantId::new(),
            price: Some(Money::new(0, "INR".parse().unwrap())),
        };
        assert!(listing.amount_due().is_none());

        let paid = EventListing {
            price: Some(Money::new(500, "INR".parse().unwrap())),
            ..listing
        };
        assert_eq!(paid.amount_due().map(|m| m.minor_units), Some(500));
    }

    #[test]
    fn test_payment_state_storage_round_trip() {
        for state in [
            PaymentState::None,
            PaymentState::Pending,
            PaymentState::Paid,
            PaymentState::Failed,
        ] {
            assert_eq!(PaymentState::parse(state.as_str()), Ok(state));
        }
        assert!(PaymentState::parse("paid").is_err());
    }

    #[test]
    fn test_paid_is_terminal_for_reconciliation() {
        assert!(!PaymentState::Failed.reconcilable_from().contains(&PaymentState::Paid));
        assert!(PaymentState::Paid.reconcilable_from().contains(&PaymentState::Failed));
        assert!(PaymentState::Paid.reconcilable_from().contains(&PaymentState::Pending));
    }

    #[test]
    fn test_identifier_parses_from_display() {
        let id = SubjectId::new();
        let parsed: SubjectId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
