//! Scriptable payment order gateway.

use crate::gateway::{GatewayError, GatewayResult, OrderRequest, PaymentOrder, PaymentOrderGateway};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// How the mock answers the next `create_order` calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayBehavior {
    /// Create an order with a sequential id (`order_mock_1`, `order_mock_2`, ...)
    Succeed,
    /// Fail every call with this error
    Fail(GatewayError),
    /// Never answer; callers are expected to time out
    Stall,
}

/// Mock payment order gateway.
///
/// Records every request it receives, whatever the configured behavior.
#[derive(Debug, Clone)]
pub struct MockOrderGateway {
    behavior: Arc<Mutex<GatewayBehavior>>,
    requests: Arc<Mutex<Vec<OrderRequest>>>,
    next_order: Arc<AtomicU64>,
}

impl MockOrderGateway {
    /// Creates a gateway that always succeeds
    #[must_use]
    pub fn new() -> Self {
        Self {
            behavior: Arc::new(Mutex::new(GatewayBehavior::Succeed)),
            requests: Arc::new(Mutex::new(Vec::new())),
            next_order: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Creates a gateway that fails every call with `error`
    #[must_use]
    pub fn failing(error: GatewayError) -> Self {
        let gateway = Self::new();
        gateway.set_behavior(GatewayBehavior::Fail(error));
        gateway
    }

    /// Creates a gateway that never answers
    #[must_use]
    pub fn stalled() -> Self {
        let gateway = Self::new();
        gateway.set_behavior(GatewayBehavior::Stall);
        gateway
    }

    /// Change behavior for subsequent calls.
    pub fn set_behavior(&self, behavior: GatewayBehavior) {
        *self.behavior.lock().unwrap_or_else(PoisonError::into_inner) = behavior;
    }

    /// Requests received so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<OrderRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for MockOrderGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentOrderGateway for MockOrderGateway {
    async fn create_order(&self, request: &OrderRequest) -> GatewayResult<PaymentOrder> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        let behavior = self
            .behavior
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match behavior {
            GatewayBehavior::Succeed => {
                let sequence = self.next_order.fetch_add(1, Ordering::SeqCst);
                let order_id = format!("order_mock_{sequence}");
                tracing::debug!(
                    order_id = %order_id,
                    amount = request.amount.minor_units,
                    reference = %request.reference,
                    "Mock payment order created"
                );
                Ok(PaymentOrder {
                    order_id,
                    amount: request.amount.clone(),
                })
            }
            GatewayBehavior::Fail(error) => Err(error),
            GatewayBehavior::Stall => {
                std::future::pending::<()>().await;
                Err(GatewayError::Timeout)
            }
        }
    }
}
