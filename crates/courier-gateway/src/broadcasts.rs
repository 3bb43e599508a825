// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast endpoints. Runs happen in the background; these only
//! create, start, cancel and report.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use courier_engine::NewBroadcast;

use crate::error::{ApiJson, ApiResult};
use crate::server::GatewayState;

/// GET /api/broadcasts
pub async fn list(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "broadcasts": state.core.broadcasts.list() }))
}

/// POST /api/broadcasts
pub async fn create(
    State(state): State<GatewayState>,
    ApiJson(req): ApiJson<NewBroadcast>,
) -> ApiResult<Json<Value>> {
    let broadcast = state.core.broadcasts.create(req)?;
    Ok(Json(json!({ "success": true, "broadcast": broadcast })))
}

/// GET /api/broadcasts/{id}
pub async fn get(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let broadcast = state.core.broadcasts.get(&id)?;
    Ok(Json(json!({ "broadcast": broadcast })))
}

/// POST /api/broadcasts/{id}/start
///
/// Starting a running broadcast is a no-op success.
pub async fn start(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let broadcast = state.core.broadcasts.start(&id)?;
    Ok(Json(json!({ "success": true, "broadcast": broadcast })))
}

/// POST /api/broadcasts/{id}/cancel
pub async fn cancel(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let broadcast = state.core.broadcasts.cancel(&id)?;
    Ok(Json(json!({ "success": true, "broadcast": broadcast })))
}

/// DELETE /api/broadcasts/{id}
///
/// A running broadcast is cancelled before its record goes.
pub async fn delete(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.core.broadcasts.delete(&id)?;
    Ok(Json(json!({
        "success": true,
        "broadcasts": state.core.broadcasts.list(),
    })))
}
