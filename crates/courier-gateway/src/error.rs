// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping from engine errors to HTTP responses.

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use courier_core::CourierError;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

/// Body of a policy denial: the reason plus `can_send: false`.
#[derive(Debug, Serialize)]
pub struct DeniedResponse {
    pub error: String,
    pub can_send: bool,
}

/// An engine error on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub CourierError);

pub type ApiResult<T> = Result<T, ApiError>;

impl From<CourierError> for ApiError {
    fn from(err: CourierError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(CourierError::Validation(rejection.body_text()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            CourierError::Validation(_) => StatusCode::BAD_REQUEST,
            CourierError::PolicyDenied { .. } => StatusCode::FORBIDDEN,
            CourierError::NotFound { .. } => StatusCode::NOT_FOUND,
            CourierError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CourierError::Storage { .. }
            | CourierError::Messenger { .. }
            | CourierError::Timeout { .. }
            | CourierError::Internal(_)
            | CourierError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self.0 {
            CourierError::PolicyDenied { reason } => (
                status,
                Json(DeniedResponse {
                    error: reason,
                    can_send: false,
                }),
            )
                .into_response(),
            CourierError::Validation(message) | CourierError::Unavailable(message) => {
                (status, Json(ErrorResponse { error: message })).into_response()
            }
            CourierError::Storage { source } => {
                tracing::error!(error = %source, "store error while handling request");
                (
                    status,
                    Json(ErrorResponse {
                        error: "store error".to_string(),
                    }),
                )
                    .into_response()
            }
            other => {
                if status.is_server_error() {
                    tracing::warn!(error = %other, "request failed");
                }
                (
                    status,
                    Json(ErrorResponse {
                        error: other.to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

/// `Json` extractor whose rejections render as `{"error": ...}` with 400.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn policy_denial_carries_can_send() {
        let response = ApiError(CourierError::PolicyDenied {
            reason: "daily cap".into(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["error"], "daily cap");
        assert_eq!(body["can_send"], false);
    }

    #[tokio::test]
    async fn store_errors_are_sanitized() {
        let response =
            ApiError(CourierError::storage(std::io::Error::other("password=hunter2"))).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "store error");
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (CourierError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (CourierError::not_found("account", "a"), StatusCode::NOT_FOUND),
            (CourierError::Unavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                CourierError::Timeout {
                    duration: Duration::from_secs(1),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (CourierError::messenger("down"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }

    #[tokio::test]
    async fn not_found_message_is_readable() {
        let response = ApiError(CourierError::not_found("broadcast", "b1")).into_response();
        let body = body_json(response).await;
        assert_eq!(body["error"], "broadcast not found: b1");
    }
}
