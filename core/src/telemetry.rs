//! Business metrics for registration, check-in and payment reconciliation.
//!
//! Recording goes through the `metrics` facade; without an installed recorder every
//! call is a no-op, so the core is usable in tests and tools without an exporter.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `gatepass_registrations_total{outcome}` - registration attempts by outcome
//! - `gatepass_checkins_total{outcome}` - check-in attempts by outcome
//! - `gatepass_webhooks_total{outcome}` - webhook deliveries by outcome
//! - `gatepass_payment_outcomes_total{state}` - registrations moved to a payment state
//!
//! ## Histograms
//! - `gatepass_payment_order_duration_seconds` - time spent creating gateway orders

use metrics::{describe_counter, describe_histogram};

/// Registration attempts by outcome.
pub const REGISTRATIONS_TOTAL: &str = "gatepass_registrations_total";
/// Check-in attempts by outcome.
pub const CHECKINS_TOTAL: &str = "gatepass_checkins_total";
/// Webhook deliveries by outcome.
pub const WEBHOOKS_TOTAL: &str = "gatepass_webhooks_total";
/// Registrations moved to a payment state.
pub const PAYMENT_OUTCOMES_TOTAL: &str = "gatepass_payment_outcomes_total";
/// Gateway order creation latency.
pub const PAYMENT_ORDER_DURATION: &str = "gatepass_payment_order_duration_seconds";

/// Initialize and register all metric descriptions.
///
/// Call once at startup, after the recorder is installed.
pub fn describe_metrics() {
    describe_counter!(
        REGISTRATIONS_TOTAL,
        "Registration attempts by outcome (free, pending_payment, already_registered, event_not_found, gateway_error, storage_error)"
    );
    describe_counter!(
        CHECKINS_TOTAL,
        "Check-in attempts by outcome (checked_in, already_checked_in, invalid_token, not_found, payment_incomplete, storage_error)"
    );
    describe_counter!(
        WEBHOOKS_TOTAL,
        "Payment webhook deliveries by outcome (applied, ignored, invalid_signature, malformed, storage_error)"
    );
    describe_counter!(
        PAYMENT_OUTCOMES_TOTAL,
        "Registrations whose payment state changed, by new state"
    );
    describe_histogram!(
        PAYMENT_ORDER_DURATION,
        "Time taken by the payment gateway to create an order"
    );

    tracing::info!("Gatepass metrics registered");
}

/// Record a registration attempt.
pub fn record_registration(outcome: &'static str) {
    metrics::counter!(REGISTRATIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a check-in attempt.
pub fn record_check_in(outcome: &'static str) {
    metrics::counter!(CHECKINS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a webhook delivery.
pub fn record_webhook(outcome: &'static str) {
    metrics::counter!(WEBHOOKS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record registrations moved to `state`.
pub fn record_payment_outcome(state: &'static str, count: u64) {
    metrics::counter!(PAYMENT_OUTCOMES_TOTAL, "state" => state).increment(count);
}

/// Record how long order creation took.
pub fn record_order_duration(seconds: f64) {
    metrics::histogram!(PAYMENT_ORDER_DURATION).record(seconds);
}
