//! HTTP surface for Gatepass.
//!
//! Thin axum shell over the `gatepass-core` services: handlers extract the caller's
//! [`Identity`], call one service method, and map the result to a response. Domain
//! errors become [`AppError`]s with stable codes.
//!
//! # Request Flow
//!
//! 1. **Correlation id** assigned by [`correlation_id_layer`]
//! 2. **Identity** extracted from trusted upstream headers
//! 3. **Service call** on the ledger, check-in processor or webhook reconciler
//! 4. **Map result** to JSON, or to an [`AppError`]
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(ledger, check_in, webhooks, store);
//! let app = gatepass_web::router(state);
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use error::AppError;
pub use extractors::{CorrelationId, Identity, Role};
pub use handlers::webhooks::WEBHOOK_SIGNATURE_HEADER;
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
