// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the admin API.

use std::future::Future;
use std::sync::Arc;

use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use http::header;
use tower_http::cors::{AllowOrigin, CorsLayer};

use courier_config::model::GatewayConfig;
use courier_core::CourierError;
use courier_engine::Core;

use crate::auth::{auth_middleware, AuthConfig};
use crate::{accounts, broadcasts, handlers, ws};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// The running engine.
    pub core: Arc<Core>,
    /// Authentication configuration.
    pub auth: AuthConfig,
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

impl GatewayState {
    pub fn new(core: Arc<Core>, auth: AuthConfig) -> Self {
        Self {
            core,
            auth,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Gateway server configuration (mirrors `GatewayConfig` from courier-config).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

impl From<&GatewayConfig> for ServerConfig {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            cors_origins: config.cors_origins.clone(),
        }
    }
}

/// Builds the full router.
///
/// `/api/health` and the pairing sockets sit outside the auth layer; the
/// sockets check the token during the handshake.
pub fn router(state: GatewayState, cors_origins: &[String]) -> Router {
    let auth_state = state.auth.clone();

    let public_routes = Router::new()
        .route("/api/health", get(handlers::health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/api/status", get(handlers::status))
        .route("/api/stats", get(handlers::stats))
        .route(
            "/api/settings",
            get(handlers::get_settings).post(handlers::update_settings),
        )
        .route("/api/messages", get(handlers::list_messages))
        .route("/api/users", get(handlers::list_users))
        .route(
            "/api/users/{id}",
            get(handlers::get_user).put(handlers::update_user),
        )
        .route("/api/users/{id}/messages", get(handlers::user_messages))
        .route("/api/send", post(handlers::send_message))
        .route("/api/validate", get(handlers::validate_send))
        .route(
            "/api/keywords",
            get(handlers::list_keywords).post(handlers::add_keyword),
        )
        .route("/api/keywords/{keyword}", delete(handlers::delete_keyword))
        .route(
            "/api/templates",
            get(handlers::list_templates).post(handlers::add_template),
        )
        .route("/api/templates/{id}", delete(handlers::delete_template))
        .route(
            "/api/scheduled",
            get(handlers::list_scheduled).post(handlers::add_scheduled),
        )
        .route("/api/scheduled/{id}", delete(handlers::delete_scheduled))
        .route(
            "/api/broadcasts",
            get(broadcasts::list).post(broadcasts::create),
        )
        .route(
            "/api/broadcasts/{id}",
            get(broadcasts::get).delete(broadcasts::delete),
        )
        .route("/api/broadcasts/{id}/start", post(broadcasts::start))
        .route("/api/broadcasts/{id}/cancel", post(broadcasts::cancel))
        .route("/api/accounts", get(accounts::list).post(accounts::add))
        .route("/api/accounts/{id}", delete(accounts::remove))
        .route("/api/accounts/{id}/status", get(accounts::status))
        .route("/api/accounts/{id}/connect", post(accounts::connect))
        .route("/api/accounts/{id}/disconnect", post(accounts::disconnect))
        .route("/api/accounts/{id}/messages", get(accounts::messages))
        .route_layer(axum_middleware::from_fn_with_state(
            auth_state,
            auth_middleware,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/api/accounts/{id}/qr", get(ws::account_pairing))
        .route("/api/qr", get(ws::default_pairing))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Serves `app` on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: tokio::net::TcpListener,
    app: Router,
    shutdown: F,
) -> Result<(), CourierError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| CourierError::Internal(format!("gateway server error: {e}")))
}

/// Binds the configured address and serves the admin API.
///
/// Returns once `shutdown` resolves and in-flight requests have finished.
pub async fn start_server<F>(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: F,
) -> Result<(), CourierError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state, &config.cors_origins);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CourierError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");
    serve(listener, app, shutdown).await?;
    tracing::info!("Gateway server stopped");
    Ok(())
}
