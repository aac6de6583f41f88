//! Payment order gateway contract.
//!
//! The gateway is an external collaborator (Razorpay, Stripe and similar order APIs).
//! This core only needs it to create an order and hand back a stable, opaque order id;
//! how the payment outcome arrives is the [`webhook`](crate::webhook) module's concern.

use crate::types::Money;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Payment gateway error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// No response within the configured order timeout
    #[error("payment gateway timed out")]
    Timeout,
    /// Gateway answered but refused to create the order
    #[error("payment gateway rejected the order ({status}): {message}")]
    Rejected {
        /// HTTP status (or provider code) returned
        status: u16,
        /// Provider message
        message: String,
    },
    /// Network or connection failure
    #[error("payment gateway unreachable: {0}")]
    Transport(String),
    /// Gateway response could not be understood
    #[error("invalid payment gateway response: {0}")]
    InvalidResponse(String),
}

/// Request to create a payment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Amount in minor units, with currency
    pub amount: Money,
    /// Caller reference echoed back by the provider (we use the registration id)
    pub reference: String,
}

/// A created payment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOrder {
    /// Gateway order id; used later as the reconciliation key
    pub order_id: String,
    /// Amount the order was created for
    pub amount: Money,
}

/// Payment order gateway trait
///
/// Implementations must not retry internally: a retried order creation is a
/// potential double charge, so retries are left to the caller.
#[async_trait]
pub trait PaymentOrderGateway: Send + Sync {
    /// Create a payment order.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the provider cannot be reached, rejects the
    /// request, or answers with something unparseable.
    async fn create_order(&self, request: &OrderRequest) -> GatewayResult<PaymentOrder>;
}
