//! Gatepass HTTP server.
//!
//! ```bash
//! export TICKET_SIGNING_SECRET=$(openssl rand -hex 32)
//! export PAYMENT_WEBHOOK_SECRET=whsec_...
//! cargo run --bin gatepass-server
//! ```

use anyhow::Context;
use gatepass_core::environment::SystemClock;
use gatepass_core::telemetry;
use gatepass_postgres::{PostgresEventCatalog, PostgresRegistrationStore};
use gatepass_server::{Config, HttpOrderGateway, build_state};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gatepass=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Gatepass server");

    let config = Config::from_env().context("Invalid configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        gateway = %config.payments.gateway_url,
        ticket_ttl_secs = config.tickets.ttl_secs,
        "Configuration loaded"
    );
    if config.payments.key_id.is_empty() || config.payments.key_secret.is_empty() {
        warn!("Payment gateway credentials are not set; paid registrations will fail");
    }

    let metrics_addr: SocketAddr = format!(
        "{}:{}",
        config.server.metrics_host, config.server.metrics_port
    )
    .parse()
    .context("Invalid metrics address")?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    telemetry::describe_metrics();
    info!(address = %metrics_addr, "Metrics exporter listening");

    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let store = Arc::new(PostgresRegistrationStore::new(pool.clone()));
    store.migrate().await.context("Failed to run migrations")?;
    info!("Migrations complete");

    let gateway = HttpOrderGateway::new(
        &config.payments.gateway_url,
        config.payments.key_id.clone(),
        config.payments.key_secret.clone(),
        config.order_timeout(),
    )
    .context("Failed to build payment gateway client")?;

    let state = build_state(
        &config,
        store,
        Arc::new(PostgresEventCatalog::new(pool)),
        Arc::new(gateway),
        Arc::new(SystemClock),
    )?;
    let app = gatepass_web::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    let (signalled_tx, signalled_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signalled_tx.send(());
            })
            .await
    });

    let shutdown_timeout = config.shutdown_timeout();
    tokio::select! {
        result = &mut server => result??,
        () = async {
            if signalled_rx.await.is_ok() {
                tokio::time::sleep(shutdown_timeout).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "In-flight requests did not drain; exiting"
            );
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Waits for Ctrl+C (SIGINT) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            warn!(error = %error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
