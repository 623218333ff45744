use std::error::Error;
use std::future::ready;
use std::net::SocketAddr;

use axum::routing::get;
use kycgate::{app, initialize_state, telemetry};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_PORT: u16 = 8080;
const OTLP_ENDPOINT_ENV: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let otlp_endpoint = std::env::var(OTLP_ENDPOINT_ENV).ok();

    // Export logs only when a collector is configured.
    let otlp_logs = match &otlp_endpoint {
        Some(endpoint) => Some(telemetry::setup_logging(endpoint)?),
        None => None,
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(otlp_logs)
        .init();

    if otlp_endpoint.is_some() {
        opentelemetry::global::set_tracer_provider(telemetry::setup_tracer()?);
    }
    let metrics = telemetry::setup_metrics_recorder()?;

    let state = initialize_state().await?;
    let router = app(state)
        .route("/metrics", get(move || ready(metrics.render())));

    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    tracing::info!(%port, "server started");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "cannot listen for shutdown signal");
        return;
    }
    tracing::info!("shutdown signal received");
}
