// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the admin REST API.
//!
//! Covers health, settings, the message log, users, operator sends, the
//! policy dry-run, keywords, templates and scheduled messages. Accounts and
//! broadcasts live in their own modules.

use std::future::Future;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use courier_core::{
    CourierError, Direction, MessageClass, MessageId, MessageQuery, MessageScope, NewMessage,
    NewUser, User, UserUpdate,
};
use courier_engine::{Account, Pacing, SettingsPatch, SettingsSnapshot, VerdictView, with_deadline};

use crate::error::{ApiJson, ApiResult};
use crate::server::GatewayState;

/// Largest page the message endpoints hand out.
pub const MAX_PAGE: usize = 1000;

/// Messages counted by `GET /api/stats`.
const STATS_WINDOW: usize = 1000;

/// Runs a row-store call under the engine's RPC deadline.
pub(crate) async fn rpc<T>(
    state: &GatewayState,
    fut: impl Future<Output = Result<T, CourierError>>,
) -> Result<T, CourierError> {
    with_deadline(state.core.rpc_timeout(), fut).await
}

/// `limit` / `offset` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

impl Page {
    pub fn query(&self, scope: MessageScope, default_limit: usize) -> MessageQuery {
        let limit = self.limit.unwrap_or(default_limit).min(MAX_PAGE);
        MessageQuery::new(scope, limit, self.offset.unwrap_or(0))
    }
}

/// A page of the message log.
#[derive(Debug, Serialize)]
pub struct MessagePage {
    pub messages: Vec<courier_core::MessageLog>,
    pub limit: usize,
    pub offset: usize,
}

pub(crate) async fn message_page(
    state: &GatewayState,
    query: MessageQuery,
) -> ApiResult<Json<MessagePage>> {
    let messages = rpc(state, state.core.repo.list_messages(&query)).await?;
    Ok(Json(MessagePage {
        messages,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Response body for GET /api/health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub time: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// GET /api/health
pub async fn health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        time: state.core.clock.now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /api/status
pub async fn status(State(state): State<GatewayState>) -> Json<Value> {
    let manager = &state.core.manager;
    Json(json!({
        "connected": manager.any_connected().await,
        "logged_in": manager.any_logged_in().await,
        "accounts": manager.list().await.len(),
    }))
}

/// Dashboard counters.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Stats {
    pub total_users: usize,
    pub total_messages: usize,
    pub incoming_messages: usize,
    pub outgoing_messages: usize,
    pub connected: bool,
}

/// GET /api/stats
pub async fn stats(State(state): State<GatewayState>) -> ApiResult<Json<Stats>> {
    let users = rpc(&state, state.core.repo.list_users()).await?;
    let messages = rpc(
        &state,
        state
            .core
            .repo
            .list_messages(&MessageQuery::new(MessageScope::All, STATS_WINDOW, 0)),
    )
    .await?;
    let incoming = messages
        .iter()
        .filter(|m| m.direction == Direction::Incoming)
        .count();
    Ok(Json(Stats {
        total_users: users.len(),
        total_messages: messages.len(),
        incoming_messages: incoming,
        outgoing_messages: messages.len() - incoming,
        connected: state.core.manager.any_connected().await,
    }))
}

/// GET /api/settings
pub async fn get_settings(State(state): State<GatewayState>) -> Json<SettingsSnapshot> {
    Json(state.core.settings.snapshot())
}

/// POST /api/settings
pub async fn update_settings(
    State(state): State<GatewayState>,
    ApiJson(patch): ApiJson<SettingsPatch>,
) -> ApiResult<Json<Value>> {
    state.core.settings.apply(&patch)?;
    info!(?patch, "settings updated");
    Ok(Json(json!({
        "success": true,
        "settings": state.core.settings.snapshot(),
    })))
}

/// GET /api/messages
pub async fn list_messages(
    State(state): State<GatewayState>,
    Query(page): Query<Page>,
) -> ApiResult<Json<MessagePage>> {
    message_page(&state, page.query(MessageScope::All, 50)).await
}

/// GET /api/users
pub async fn list_users(State(state): State<GatewayState>) -> ApiResult<Json<Value>> {
    let users = rpc(&state, state.core.repo.list_users()).await?;
    Ok(Json(json!({ "users": users })))
}

async fn require_user(state: &GatewayState, id: &str) -> Result<User, CourierError> {
    rpc(state, state.core.repo.find_user(id))
        .await?
        .ok_or_else(|| CourierError::not_found("user", id))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user = require_user(&state, &id).await?;
    Ok(Json(json!({ "user": user })))
}

/// PUT /api/users/{id}
///
/// Accepts `name`, `notes`, `blocked` and `opt_in`; anything else is ignored.
pub async fn update_user(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<UserUpdate>,
) -> ApiResult<Json<Value>> {
    if update.is_empty() {
        return Err(CourierError::Validation("no updates provided".into()).into());
    }
    require_user(&state, &id).await?;
    rpc(&state, state.core.repo.update_user(&id, &update)).await?;
    let user = require_user(&state, &id).await?;
    info!(user_id = %id, "user updated by operator");
    Ok(Json(json!({ "success": true, "user": user })))
}

/// GET /api/users/{id}/messages
pub async fn user_messages(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Query(page): Query<Page>,
) -> ApiResult<Json<MessagePage>> {
    message_page(&state, page.query(MessageScope::User(id), 100)).await
}

/// Request body for POST /api/send.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub phone: String,
    pub message: String,
    /// Message class; `manual` when absent.
    #[serde(default, rename = "type")]
    pub class: Option<MessageClass>,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// POST /api/send
///
/// Policy gate first (403 on denial), then the named account or the first
/// connected one (503 when none). The send is paced with the usual jitter.
pub async fn send_message(
    State(state): State<GatewayState>,
    ApiJson(req): ApiJson<SendRequest>,
) -> ApiResult<Json<Value>> {
    let phone = req.phone.trim();
    if phone.is_empty() || req.message.trim().is_empty() {
        return Err(CourierError::Validation("phone and message are required".into()).into());
    }
    let class = req.class.unwrap_or(MessageClass::Manual);

    let verdict = state.core.policy.validate(&class, phone).await;
    if let Some(reason) = verdict.reason() {
        warn!(phone = %phone, class = %class, reason = %reason, "operator send denied");
    }
    verdict.into_result()?;

    let manager = &state.core.manager;
    let account = manager.route(req.account_id.as_deref()).await?;
    let id = manager
        .send_from(&account, phone, &req.message, &class, Pacing::Jitter)
        .await?;

    record_operator_send(&state, &account, phone, &class, &req.message, &id).await;
    Ok(Json(json!({
        "status": "sent",
        "message": "Message sent successfully",
        "message_id": id.0,
        "account_id": account.id(),
    })))
}

/// Logs an operator send against the recipient's user row, creating it if
/// needed. Failures are logged; the message already left.
async fn record_operator_send(
    state: &GatewayState,
    account: &Account,
    phone: &str,
    class: &MessageClass,
    text: &str,
    id: &MessageId,
) {
    let repo = &state.core.repo;
    let user = match rpc(state, repo.find_user_by_phone_and_account(phone, account.id())).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            rpc(
                state,
                repo.create_user(&NewUser {
                    phone: phone.to_string(),
                    account_id: Some(account.id().to_string()),
                    name: None,
                }),
            )
            .await
        }
        Err(e) => Err(e),
    };
    let user = match user {
        Ok(user) => user,
        Err(e) => {
            warn!(phone = %phone, error = %e, "could not resolve user for sent message");
            return;
        }
    };

    if *class == MessageClass::System
        && let Err(e) = rpc(state, repo.update_user(&user.id, &UserUpdate::touch_last_system_sent())).await
    {
        warn!(user_id = %user.id, error = %e, "failed to stamp last system send");
    }
    let entry = NewMessage::outgoing(&user.id, Some(account.id()), class.clone(), text, Some(id));
    if let Err(e) = rpc(state, repo.append_message(&entry)).await {
        warn!(user_id = %user.id, error = %e, "failed to log operator send");
    }
}

/// Query of GET /api/validate.
#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, rename = "type")]
    pub class: Option<MessageClass>,
}

/// GET /api/validate
///
/// Dry-runs the policy gate. The class defaults to `system`.
pub async fn validate_send(
    State(state): State<GatewayState>,
    Query(query): Query<ValidateQuery>,
) -> ApiResult<Json<VerdictView>> {
    let phone = query
        .phone
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| CourierError::Validation("phone is required".into()))?;
    let class = query.class.unwrap_or(MessageClass::System);
    let verdict = state.core.policy.validate(&class, phone.trim()).await;
    Ok(Json(verdict.into()))
}

fn keywords_body(state: &GatewayState) -> Json<Value> {
    Json(json!({ "success": true, "keywords": state.core.keywords.all() }))
}

/// GET /api/keywords
pub async fn list_keywords(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "keywords": state.core.keywords.all() }))
}

#[derive(Debug, Deserialize)]
pub struct KeywordRequest {
    pub keyword: String,
    pub response: String,
}

/// POST /api/keywords
pub async fn add_keyword(
    State(state): State<GatewayState>,
    ApiJson(req): ApiJson<KeywordRequest>,
) -> ApiResult<Json<Value>> {
    state.core.keywords.insert(&req.keyword, &req.response)?;
    info!(keyword = %req.keyword, "keyword added");
    Ok(keywords_body(&state))
}

/// DELETE /api/keywords/{keyword}
pub async fn delete_keyword(
    State(state): State<GatewayState>,
    Path(keyword): Path<String>,
) -> Json<Value> {
    let removed = state.core.keywords.remove(&keyword);
    info!(keyword = %keyword, removed, "keyword delete");
    keywords_body(&state)
}

/// GET /api/templates
pub async fn list_templates(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "templates": state.core.templates.list() }))
}

#[derive(Debug, Deserialize)]
pub struct TemplateRequest {
    pub name: String,
    pub content: String,
}

/// POST /api/templates
pub async fn add_template(
    State(state): State<GatewayState>,
    ApiJson(req): ApiJson<TemplateRequest>,
) -> ApiResult<Json<Value>> {
    let template = state
        .core
        .templates
        .add(&req.name, &req.content, state.core.clock.now_utc())?;
    Ok(Json(json!({
        "success": true,
        "template": template,
        "templates": state.core.templates.list(),
    })))
}

/// DELETE /api/templates/{id}
pub async fn delete_template(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.core.templates.remove(&id)?;
    Ok(Json(json!({
        "success": true,
        "templates": state.core.templates.list(),
    })))
}

/// GET /api/scheduled
pub async fn list_scheduled(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({ "scheduled": state.core.scheduled.list() }))
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub phone: String,
    pub message: String,
    /// RFC 3339 instant with an offset.
    pub scheduled_at: String,
}

/// POST /api/scheduled
pub async fn add_scheduled(
    State(state): State<GatewayState>,
    ApiJson(req): ApiJson<ScheduleRequest>,
) -> ApiResult<Json<Value>> {
    let row = state.core.scheduled.add(
        &req.phone,
        &req.message,
        &req.scheduled_at,
        state.core.clock.now_utc(),
    )?;
    info!(scheduled_id = %row.id, phone = %row.phone, due = %row.scheduled_at, "message scheduled");
    Ok(Json(json!({
        "success": true,
        "scheduled_message": row,
        "scheduled": state.core.scheduled.list(),
    })))
}

/// DELETE /api/scheduled/{id}
pub async fn delete_scheduled(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.core.scheduled.remove(&id)?;
    Ok(Json(json!({
        "success": true,
        "scheduled": state.core.scheduled.list(),
    })))
}
