// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PostgREST (Supabase) implementation of the [`Repository`] trait.
//!
//! Talks to `{url}/rest/v1` with the project key sent both as `apikey` and
//! as a bearer token.

use std::time::Duration;

use async_trait::async_trait;
use courier_core::{
    CourierError, FieldUpdate, MessageLog, MessageQuery, MessageScope, NewMessage, NewUser,
    Repository, User, UserUpdate,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

/// Value PostgreSQL's timestamp parser reads as "current transaction time".
const SERVER_NOW: &str = "now";

/// Non-success reply from PostgREST.
#[derive(Debug, Error)]
#[error("row store returned {status}: {body}")]
pub struct PostgrestError {
    pub status: StatusCode,
    pub body: String,
}

/// Row store reached over PostgREST.
#[derive(Debug, Clone)]
pub struct PostgrestRepository {
    client: reqwest::Client,
    base_url: String,
}

impl PostgrestRepository {
    /// Build a client for the project at `supabase_url` authenticated with `key`.
    pub fn new(supabase_url: &str, key: &str, timeout: Duration) -> Result<Self, CourierError> {
        let mut headers = HeaderMap::new();
        let key_value = HeaderValue::from_str(key)
            .map_err(|e| CourierError::Config(format!("invalid store key header value: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| CourierError::Config(format!("invalid store key header value: {e}")))?;
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(CourierError::storage)?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", supabase_url.trim_end_matches('/')),
        })
    }

    fn url(&self, table: &str, params: &[(&str, String)]) -> Result<Url, CourierError> {
        let mut url = Url::parse(&format!("{}/{table}", self.base_url))
            .map_err(|e| CourierError::Config(format!("invalid store url: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<T, CourierError> {
        debug!(%method, %url, "row store request");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req
                .header("Prefer", "return=representation")
                .json(&body);
        }
        let resp = req.send().await.map_err(CourierError::storage)?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CourierError::storage(PostgrestError { status, body }));
        }
        resp.json::<T>().await.map_err(CourierError::storage)
    }

    async fn first_user(&self, filters: Vec<(&str, String)>) -> Result<Option<User>, CourierError> {
        let mut params = vec![("select", "*".to_string())];
        params.extend(filters);
        params.push(("order", "created_at.asc".to_string()));
        params.push(("limit", "1".to_string()));
        let users: Vec<User> = self
            .request(Method::GET, self.url("users", &params)?, None)
            .await?;
        Ok(users.into_iter().next())
    }
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

fn ts_json(update: &FieldUpdate<chrono::DateTime<chrono::Utc>>) -> Value {
    match update {
        FieldUpdate::Set(ts) => Value::String(ts.to_rfc3339()),
        FieldUpdate::ServerTimestamp => Value::String(SERVER_NOW.to_string()),
    }
}

/// JSON body for a PATCH; `updated_at` is always stamped by the server.
pub fn update_body(update: &UserUpdate) -> Value {
    let mut body = Map::new();
    if let Some(name) = &update.name {
        body.insert("name".into(), json!(name));
    }
    if let Some(notes) = &update.notes {
        body.insert("notes".into(), json!(notes));
    }
    if let Some(opt_in) = update.opt_in {
        body.insert("opt_in".into(), json!(opt_in));
    }
    if let Some(blocked) = update.blocked {
        body.insert("blocked".into(), json!(blocked));
    }
    if let Some(ts) = &update.last_user_message_at {
        body.insert("last_user_message_at".into(), ts_json(ts));
    }
    if let Some(ts) = &update.last_system_sent_at {
        body.insert("last_system_sent_at".into(), ts_json(ts));
    }
    body.insert("updated_at".into(), json!(SERVER_NOW));
    Value::Object(body)
}

fn message_body(msg: &NewMessage) -> Value {
    let mut body = json!({
        "user_id": msg.user_id,
        "direction": msg.direction,
        "message_type": msg.class,
        "content": msg.content,
        "status": "sent",
        "wa_message_id": msg.wa_message_id,
    });
    if let (Some(account_id), Value::Object(map)) = (&msg.account_id, &mut body) {
        map.insert("account_id".into(), json!(account_id));
    }
    body
}

fn single<T>(mut rows: Vec<T>, table: &str) -> Result<T, CourierError> {
    match rows.pop() {
        Some(row) if rows.is_empty() => Ok(row),
        _ => Err(CourierError::Internal(format!(
            "row store returned an unexpected representation for {table}"
        ))),
    }
}

#[async_trait]
impl Repository for PostgrestRepository {
    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, CourierError> {
        self.first_user(vec![("phone", eq(phone))]).await
    }

    async fn find_user_by_phone_and_account(
        &self,
        phone: &str,
        account_id: &str,
    ) -> Result<Option<User>, CourierError> {
        self.first_user(vec![("phone", eq(phone)), ("account_id", eq(account_id))])
            .await
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, CourierError> {
        self.first_user(vec![("id", eq(id))]).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, CourierError> {
        let body = serde_json::to_value(user).map_err(CourierError::storage)?;
        let rows: Vec<User> = self
            .request(Method::POST, self.url("users", &[])?, Some(body))
            .await?;
        single(rows, "users")
    }

    async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<(), CourierError> {
        if update.is_empty() {
            return Ok(());
        }
        let url = self.url("users", &[("id", eq(id))])?;
        let _: Vec<User> = self
            .request(Method::PATCH, url, Some(update_body(update)))
            .await?;
        Ok(())
    }

    async fn append_message(&self, message: &NewMessage) -> Result<MessageLog, CourierError> {
        let rows: Vec<MessageLog> = self
            .request(
                Method::POST,
                self.url("messages", &[])?,
                Some(message_body(message)),
            )
            .await?;
        single(rows, "messages")
    }

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageLog>, CourierError> {
        let mut params = vec![("select", "*".to_string())];
        let order = match &query.scope {
            MessageScope::All => "created_at.desc",
            MessageScope::User(id) => {
                params.push(("user_id", eq(id)));
                "created_at.asc"
            }
            MessageScope::Account(id) => {
                params.push(("account_id", eq(id)));
                "created_at.desc"
            }
        };
        params.push(("order", order.to_string()));
        params.push(("limit", query.limit.to_string()));
        params.push(("offset", query.offset.to_string()));
        self.request(Method::GET, self.url("messages", &params)?, None)
            .await
    }

    async fn list_users(&self) -> Result<Vec<User>, CourierError> {
        let params = [
            ("select", "*".to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        self.request(Method::GET, self.url("users", &params)?, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Direction, MessageClass};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo(server: &MockServer) -> PostgrestRepository {
        PostgrestRepository::new(&server.uri(), "anon-key", Duration::from_secs(5)).unwrap()
    }

    fn user_json(id: &str) -> Value {
        json!({
            "id": id,
            "phone": "6281",
            "name": null,
            "notes": null,
            "account_id": "acc1",
            "opt_in": true,
            "blocked": false,
            "last_user_message_at": null,
            "last_system_sent_at": "2026-03-02T03:00:00+00:00",
            "created_at": "2026-03-01T00:00:00+00:00",
            "updated_at": "2026-03-02T03:00:00+00:00"
        })
    }

    #[tokio::test]
    async fn finds_user_by_phone_and_account_with_auth_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("phone", "eq.6281"))
            .and(query_param("account_id", "eq.acc1"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_json("u1")])))
            .expect(1)
            .mount(&server)
            .await;

        let user = repo(&server)
            .find_user_by_phone_and_account("6281", "acc1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.last_system_sent_at.is_some());
    }

    #[tokio::test]
    async fn empty_result_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        assert!(repo(&server).find_user("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_user_requests_representation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/users"))
            .and(header("prefer", "return=representation"))
            .and(body_partial_json(json!({"phone": "6281", "account_id": "acc1"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([user_json("u9")])))
            .mount(&server)
            .await;

        let user = repo(&server)
            .create_user(&NewUser {
                phone: "6281".into(),
                account_id: Some("acc1".into()),
                name: None,
            })
            .await
            .unwrap();
        assert_eq!(user.id, "u9");
    }

    #[tokio::test]
    async fn server_timestamp_is_sent_as_now() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/users"))
            .and(query_param("id", "eq.u1"))
            .and(body_partial_json(json!({
                "last_system_sent_at": "now",
                "updated_at": "now"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([user_json("u1")])))
            .expect(1)
            .mount(&server)
            .await;

        repo(&server)
            .update_user("u1", &UserUpdate::touch_last_system_sent())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn user_conversation_is_ascending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/messages"))
            .and(query_param("user_id", "eq.u1"))
            .and(query_param("order", "created_at.asc"))
            .and(query_param("limit", "100"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "id": "m1",
                "user_id": "u1",
                "account_id": "acc1",
                "direction": "incoming",
                "message_type": "user",
                "content": "jadwal",
                "status": "sent",
                "wa_message_id": null,
                "created_at": "2026-03-02T03:00:00+00:00"
            }])))
            .mount(&server)
            .await;

        let msgs = repo(&server)
            .list_messages(&MessageQuery::new(MessageScope::User("u1".into()), 100, 0))
            .await
            .unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].direction, Direction::Incoming);
        assert_eq!(msgs[0].class, MessageClass::User);
    }

    #[tokio::test]
    async fn error_status_is_storage_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("JWT expired"))
            .mount(&server)
            .await;

        let err = repo(&server)
            .append_message(&NewMessage::incoming("u1", "acc1", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Storage { .. }));
        assert!(err.to_string().contains("JWT expired"));
    }

    #[test]
    fn update_body_skips_untouched_fields() {
        let body = update_body(&UserUpdate::opt_in(false));
        assert_eq!(body, json!({"opt_in": false, "updated_at": "now"}));
    }
}
