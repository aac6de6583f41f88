//! HTTP handlers.
//!
//! - [`registrations`]: register for an event, list registrations
//! - [`checkins`]: door scans
//! - [`webhooks`]: payment provider notifications
//! - [`health`]: liveness and readiness probes

pub mod checkins;
pub mod health;
pub mod registrations;
pub mod webhooks;
