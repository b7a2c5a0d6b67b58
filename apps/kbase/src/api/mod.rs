//! # Knowledge Base HTTP API Module
//!
//! HTTP REST API over the versioned store, built on axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /status` - Store status
//! - `POST /kbase` - Create a Knowledge Base (optionally from a carrier)
//! - `GET|DELETE /kbase/{tag}/{version}` - Read or delete one version
//! - `POST /kbase/{tag}/{version}/populate` - Add a carrier
//! - `POST /kbase/{tag}/{version}/next` - Fork a new version
//! - `GET /kbase/{tag}/{version}/components` - Component pointers
//! - `GET|PUT /kbase/{tag}/{version}/structure` - Dependency structure
//! - `GET /kbase/{tag}/versions` - Every version of a series
//! - `DELETE /kbase/{tag}` - Delete a whole series
//! - `POST /kbase/{tag}/{version}/dispatch/{capability}` - Run an operator
//! - `GET /operators` - Registered operators per capability
//!
//! ## Security
//!
//! API key, rate limit and CORS origins come from [`SecurityConfig`].

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::ApiKey;
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{
    CarrierJson, ComponentsResponse, DeleteSeriesResponse, DispatchRequest, ErrorResponse,
    HealthResponse, InitRequest, KnowledgeBaseResponse, OperatorsResponse, PayloadJson,
    PointerResponse, StatusResponse, StructureResponse, VersionsResponse, error_response,
};

use crate::config::{AppConfig, SecurityConfig};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use kbase_core::{KbError, KnowledgeBaseStore, OperatorDispatcher, Registry};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: Arc<KnowledgeBaseStore>,
    pub dispatcher: OperatorDispatcher,
}

impl AppState {
    /// State without operators. Every dispatch answers `Unsupported`.
    #[must_use]
    pub fn new(store: Arc<KnowledgeBaseStore>) -> Self {
        Self::with_registry(store, Registry::empty())
    }

    #[must_use]
    pub fn with_registry(store: Arc<KnowledgeBaseStore>, registry: Registry) -> Self {
        let dispatcher = OperatorDispatcher::new(store.clone(), Arc::new(registry));
        Self { store, dispatcher }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Build the CORS layer.
///
/// - `"*"`: any origin (development only)
/// - unset: localhost only
/// - otherwise: the comma-separated list of origins
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins. This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
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
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods(ALLOWED_METHODS)
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => build_localhost_cors(),
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:3000",
        "http://localhost:8080",
        "http://127.0.0.1:3000",
        "http://127.0.0.1:8080",
    ]
    .iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing, CORS, body limit
/// 2. Rate limiting (if enabled)
/// 3. Authentication (if an API key is configured)
pub fn create_router(state: AppState, security: &SecurityConfig, body_limit: usize) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/kbase", post(handlers::init_handler))
        .route(
            "/kbase/{tag}",
            axum::routing::delete(handlers::delete_series_handler),
        )
        .route("/kbase/{tag}/versions", get(handlers::versions_handler))
        .route(
            "/kbase/{tag}/{version}",
            get(handlers::get_handler).delete(handlers::delete_handler),
        )
        .route(
            "/kbase/{tag}/{version}/populate",
            post(handlers::populate_handler),
        )
        .route(
            "/kbase/{tag}/{version}/next",
            post(handlers::next_version_handler),
        )
        .route(
            "/kbase/{tag}/{version}/components",
            get(handlers::components_handler),
        )
        .route(
            "/kbase/{tag}/{version}/structure",
            get(handlers::get_structure_handler).put(handlers::set_structure_handler),
        )
        .route(
            "/kbase/{tag}/{version}/dispatch/{capability}",
            post(handlers::dispatch_handler),
        )
        .route("/operators", get(handlers::operators_handler));

    match security.api_key() {
        Some(key) => {
            tracing::info!("API key authentication enabled");
            router = router.layer(axum_middleware::from_fn_with_state(
                ApiKey::new(key),
                auth::api_key_auth_middleware,
            ));
        }
        None => tracing::warn!(
            "API key authentication DISABLED - all endpoints are publicly accessible! \
             Set KBASE_API_KEY or [security] api_key to enable authentication."
        ),
    }

    if security.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", security.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(security.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(security.cors_origins.as_deref()))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(config: &AppConfig, state: AppState) -> Result<(), KbError> {
    let router = create_router(state, &config.security, config.server.body_limit);
    let addr = config.server.addr();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| KbError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("Knowledge Base server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| KbError::Io(format!("Server error: {}", e)))
}
