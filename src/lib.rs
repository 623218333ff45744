//! kycgate checks user profiles and identity documents before a human
//! reviewer approves them.

#![forbid(unsafe_code)]
pub mod clock;
pub mod config;
mod database;
pub mod error;
pub mod mail;
pub mod notifier;
pub mod presence;
mod router;
pub mod storage;
pub mod telemetry;
pub mod user;
pub mod verification;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::{Router, middleware as AxumMiddleware};
use error::ServerError;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use crate::clock::{Clock, SystemClock};
use crate::mail::LogMailer;
use crate::notifier::{LogNotifier, Notifier, TelegramNotifier};
use crate::presence::Presence;
use crate::storage::{BlobStorage, LocalStorage};
use crate::user::PgIdentityStore;
use crate::verification::{EmailVerification, VerificationWorkflow};

const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    headers: &[(&str, &str)],
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub workflow: Arc<VerificationWorkflow>,
    pub email: Arc<EmailVerification>,
    pub storage: Arc<dyn BlobStorage>,
    pub presence: Presence,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([
            header::AUTHORIZATION,
            header::COOKIE,
            header::HeaderName::from_static("x-review-token"),
        ]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                .allow_headers(Any),
        );

    Router::new()
        .nest("/users", router::users::router(state.clone()))
        .nest("/review", router::review::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>>
{
    // read configuration file.
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        config = config.path(path.into());
    }
    let config = config.read()?;

    let Some(postgres) = &config.postgres else {
        return Err("missing `postgres` entry on `config.yaml` file".into());
    };
    let db = database::Database::new(
        &postgres.address,
        postgres
            .username
            .as_deref()
            .unwrap_or(database::DEFAULT_CREDENTIALS),
        postgres
            .password
            .as_deref()
            .unwrap_or(database::DEFAULT_CREDENTIALS),
        postgres
            .database
            .as_deref()
            .unwrap_or(database::DEFAULT_DATABASE_NAME),
        postgres.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
    )
    .await?;

    // execute migrations scripts on start.
    sqlx::migrate!().run(&db.postgres).await?;

    let storage: Arc<dyn BlobStorage> = Arc::new(LocalStorage::new(
        &config.storage.root,
        &config.storage.public_url,
    ));

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) => Arc::new(TelegramNotifier::new(telegram)?),
        None => {
            tracing::warn!("missing `telegram` entry, reviewer notifications are only logged");
            Arc::new(LogNotifier)
        },
    };

    let store = Arc::new(PgIdentityStore::new(db.postgres));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let workflow = VerificationWorkflow::new(
        store.clone(),
        Arc::clone(&storage),
        notifier,
        Arc::clone(&clock),
    )
    .max_daily_errors(config.verification.max_daily_errors);

    let email = EmailVerification::new(
        store,
        Arc::new(LogMailer),
        clock,
        Duration::from_secs(config.verification.email_code_ttl),
    );

    let presence =
        Presence::new(Duration::from_secs(config.verification.presence_ttl));

    Ok(AppState {
        config,
        workflow: Arc::new(workflow),
        email: Arc::new(email),
        storage,
        presence,
    })
}
