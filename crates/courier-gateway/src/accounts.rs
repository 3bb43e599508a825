// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Account management endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use courier_core::MessageScope;

use crate::error::{ApiJson, ApiResult};
use crate::handlers::{message_page, MessagePage, Page};
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct AddAccountRequest {
    pub name: String,
}

/// GET /api/accounts
pub async fn list(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "accounts": state.core.manager.list().await }))
}

/// POST /api/accounts
pub async fn add(
    State(state): State<GatewayState>,
    ApiJson(req): ApiJson<AddAccountRequest>,
) -> ApiResult<Json<Value>> {
    let account = state.core.manager.add(&req.name).await?;
    info!(account_id = %account.id, name = %account.name, "account added via API");
    Ok(Json(json!({ "success": true, "account": account })))
}

/// DELETE /api/accounts/{id}
pub async fn remove(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.core.manager.remove(&id).await?;
    Ok(Json(json!({
        "success": true,
        "accounts": state.core.manager.list().await,
    })))
}

/// GET /api/accounts/{id}/status
pub async fn status(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let account = state.core.manager.status(&id).await?;
    Ok(Json(json!({ "account": account })))
}

/// POST /api/accounts/{id}/connect
pub async fn connect(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let account = state.core.manager.connect(&id).await?;
    Ok(Json(json!({ "success": true, "account": account })))
}

/// POST /api/accounts/{id}/disconnect
pub async fn disconnect(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let account = state.core.manager.disconnect(&id).await?;
    Ok(Json(json!({ "success": true, "account": account })))
}

/// GET /api/accounts/{id}/messages
pub async fn messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(page): Query<Page>,
) -> ApiResult<Json<MessagePage>> {
    state.core.manager.status(&id).await?;
    message_page(&state, page.query(MessageScope::Account(id), 50)).await
}
