//! HTTP client for the payment provider's order API.
//!
//! ```text
//! POST {base}/v1/orders
//! Authorization: Basic key_id:key_secret
//! {"amount": 50000, "currency": "INR", "receipt": "<registration id>"}
//!
//! 200 {"id": "order_...", ...}
//! ```

use crate::config::Secret;
use async_trait::async_trait;
use gatepass_core::gateway::GatewayResult;
use gatepass_core::{GatewayError, OrderRequest, PaymentOrder, PaymentOrderGateway};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest provider error body kept in [`GatewayError::Rejected`].
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct CreateOrderBody<'a> {
    amount: u64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Deserialize)]
struct CreateOrderResponse {
    id: String,
}

/// Payment order gateway over HTTP.
#[derive(Clone)]
pub struct HttpOrderGateway {
    client: Client,
    orders_url: String,
    key_id: String,
    key_secret: Secret,
}

impl HttpOrderGateway {
    /// Create a client for the provider at `base_url`.
    ///
    /// `timeout` bounds each request at the transport level; the ledger applies its
    /// own deadline on top.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        key_id: impl Into<String>,
        key_secret: Secret,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            orders_url: format!("{}/v1/orders", base_url.trim_end_matches('/')),
            key_id: key_id.into(),
            key_secret,
        })
    }
}

#[async_trait]
impl PaymentOrderGateway for HttpOrderGateway {
    async fn create_order(&self, request: &OrderRequest) -> GatewayResult<PaymentOrder> {
        let response = self
            .client
            .post(&self.orders_url)
            .basic_auth(&self.key_id, Some(self.key_secret.expose()))
            .json(&CreateOrderBody {
                amount: request.amount.minor_units,
                currency: request.amount.currency.code(),
                receipt: &request.reference,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !message.is_char_boundary(end) {
                    end -= 1;
                }
                message.truncate(end);
            }
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let order: CreateOrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        if order.id.trim().is_empty() {
            return Err(GatewayError::InvalidResponse("empty order id".to_string()));
        }

        tracing::debug!(
            order_id = %order.id,
            reference = %request.reference,
            "Payment order created"
        );
        Ok(PaymentOrder {
            order_id: order.id,
            amount: request.amount.clone(),
        })
    }
}
