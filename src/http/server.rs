//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID, security gates)
//! - Bind server to listener
//! - Graceful shutdown on signal or coordinator trigger
//!
//! Middleware ordering on `/api` (outermost first): prefix rate limit →
//! CSRF gate on mutating methods → strict rate limit on sensitive routes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::http::handlers;
use crate::observability::metrics;
use crate::security::csrf::{csrf_middleware, CsrfGuard};
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::security::secret::SecretKey;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub csrf: Arc<CsrfGuard>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: Arc<AppConfig>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and signing key.
    pub fn new(config: AppConfig, secret: SecretKey) -> Self {
        let csrf = Arc::new(CsrfGuard::new(
            secret,
            Duration::from_secs(config.security.csrf_ttl_secs),
            config.security.max_body_size,
        ));
        let state = AppState { csrf };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config: Arc::new(config),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let window = Duration::from_secs(config.rate_limit.window_secs);
        let api_limiter = Arc::new(RateLimiter::new(
            "api",
            config.rate_limit.api_max_requests,
            window,
        ));
        let report_limiter = Arc::new(RateLimiter::new(
            "report",
            config.rate_limit.sensitive_max_requests,
            window,
        ));

        let api = Router::new()
            .route("/csrf-token", get(handlers::issue_csrf_token))
            .route(
                "/report-error",
                post(handlers::report_error).layer(middleware::from_fn_with_state(
                    report_limiter,
                    rate_limit_middleware,
                )),
            )
            .layer(middleware::from_fn_with_state(
                state.csrf.clone(),
                csrf_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                api_limiter,
                rate_limit_middleware,
            ))
            .with_state(state);

        Router::new()
            .route("/health", get(handlers::health))
            .nest("/api", api)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    )))
                    .layer(middleware::from_fn(track_requests))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// Stamps every request with a UUIDv4 `x-request-id`.
#[derive(Clone, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Record per-request metrics once the response is ready.
async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    metrics::record_request(&method, &path, response.status().as_u16(), start);
    response
}

/// Wait for Ctrl+C or a coordinator trigger, whichever comes first.
async fn shutdown_signal(mut shutdown: broadcast::Receiver<()>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if result.is_ok() {
                tracing::info!("Shutdown signal received");
            }
        }
        _ = shutdown.recv() => {
            tracing::info!("Shutdown triggered");
        }
    }
}
