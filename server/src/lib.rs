//! Gatepass server library: configuration, the HTTP payment gateway client, and
//! service assembly. The binary in `main.rs` adds the runtime concerns (database
//! pool, tracing, metrics exporter, signals).

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod config;
pub mod gateway;

pub use app::{StartupError, build_state};
pub use config::{Config, ConfigError};
pub use gateway::HttpOrderGateway;
