//! # Paceline HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Engine metrics overview
//! - `GET /policies` - List policies
//! - `GET /policy/{stage}` - Show one policy
//! - `PUT /policy` - Create or replace a policy
//! - `POST /instance` - Open a stage instance
//! - `GET /instance/{id}` - Evaluate an instance (optional `?at=RFC3339`)
//! - `POST /instance/{id}/extend` - Grant an extension
//! - `POST /instance/{id}/close` - Close an instance
//! - `GET /metrics` - Prometheus metrics
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `PACELINE_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `PACELINE_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `PACELINE_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

// Re-exports for external use
pub use auth::get_api_key_from_env;
pub use middleware::{create_rate_limiter, resolve_rate_limit};
// Re-export handlers and types for integration tests (via `paceline::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    health_handler, instance_close_handler, instance_extend_handler, instance_open_handler,
    instance_show_handler, metrics_handler, policies_handler, policy_put_handler,
    policy_show_handler, status_handler,
};
#[allow(unused_imports)]
pub use types::{
    CloseRequest, CloseResponse, ExtendResponse, HealthResponse, InstanceResponse, OpenRequest,
    OpenResponse, PoliciesResponse, PolicyJson, PolicyRequest, PolicyResponse, StatusResponse,
};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use paceline_core::{Engine, PacelineError};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state containing the deadline engine.
#[derive(Clone)]
pub struct AppState {
    /// The engine owning the policy and instance stores.
    pub engine: Arc<RwLock<Engine>>,
}

impl AppState {
    /// Create new app state with an engine.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            engine: Arc::new(RwLock::new(engine)),
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `PACELINE_CORS_ORIGINS` environment variable:
/// - If "*": allows all origins (development mode - use with caution!)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
///
/// # Security Note
///
/// The default is restrictive (localhost only). Set `PACELINE_CORS_ORIGINS=*`
/// explicitly only for development or if you understand the security implications.
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("PACELINE_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            // Explicit wildcard - warn about security implications
            tracing::warn!(
                "CORS: Allowing ALL origins (PACELINE_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            // Parse comma-separated origins
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in PACELINE_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            // No configuration - default to localhost only (restrictive)
            tracing::info!("CORS: No PACELINE_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. CORS - handles preflight requests
/// 2. Tracing - logs all requests
/// 3. Rate Limiting - protects against DoS (if enabled)
/// 4. Authentication - validates API key (if configured)
///
/// `config_rate_limit` comes from the TOML config file; the
/// `PACELINE_RATE_LIMIT` environment variable still overrides it.
pub fn create_router(state: AppState, config_rate_limit: Option<u32>) -> Router {
    let cors = build_cors_layer();

    // Check if rate limiting is enabled
    let rate_limit = resolve_rate_limit(config_rate_limit);
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    // Check if authentication is enabled
    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set PACELINE_API_KEY environment variable to enable authentication."
        );
    }

    // Build base router with routes
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/policies", get(handlers::policies_handler))
        .route("/policy/{stage}", get(handlers::policy_show_handler))
        .route("/policy", put(handlers::policy_put_handler))
        .route("/instance", post(handlers::instance_open_handler))
        .route("/instance/{id}", get(handlers::instance_show_handler))
        .route(
            "/instance/{id}/extend",
            post(handlers::instance_extend_handler),
        )
        .route(
            "/instance/{id}/close",
            post(handlers::instance_close_handler),
        )
        .route("/metrics", get(handlers::metrics_handler));

    // Apply authentication middleware (innermost - runs last on request)
    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    // Apply rate limiting middleware
    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    // Apply CORS, body limit, and tracing (outermost layers)
    router
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(
    addr: &str,
    engine: Engine,
    config_rate_limit: Option<u32>,
) -> Result<(), PacelineError> {
    let state = AppState::new(engine);
    let router = create_router(state, config_rate_limit);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PacelineError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("Paceline HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| PacelineError::IoError(format!("Server error: {}", e)))
}
