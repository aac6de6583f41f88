//! In-memory implementations of every collaborator trait, for unit and integration tests.
//!
//! Enabled by the `test-utils` feature.

pub mod catalog;
pub mod clock;
pub mod gateway;
pub mod store;

pub use catalog::InMemoryEventCatalog;
pub use clock::{FixedClock, test_clock};
pub use gateway::{GatewayBehavior, MockOrderGateway};
pub use store::InMemoryRegistrationStore;
