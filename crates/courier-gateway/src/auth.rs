// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optional bearer-token authentication for the admin API.
//!
//! With no token configured every request passes (development mode). With a
//! token, `Authorization: Bearer <token>` must match. WebSocket clients that
//! cannot set headers may pass `?token=<token>` instead.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

/// Authentication configuration for the gateway.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Expected bearer token. `None` leaves the API open.
    pub bearer_token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field(
                "bearer_token",
                &self.bearer_token.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

impl AuthConfig {
    pub fn new(bearer_token: Option<String>) -> Self {
        Self {
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
        }
    }

    /// Whether the presented credential is acceptable.
    pub fn permits(&self, presented: Option<&str>) -> bool {
        match self.bearer_token.as_deref() {
            None => true,
            Some(expected) => presented == Some(expected),
        }
    }
}

/// Extracts the token from an `Authorization: Bearer` header.
pub fn bearer_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Middleware that enforces the bearer token on `/api` routes.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.permits(bearer_from_headers(request.headers())) {
        return Ok(next.run(request).await);
    }
    tracing::debug!(path = %request.uri().path(), "rejected request without a valid bearer token");
    Err(StatusCode::UNAUTHORIZED)
}
