// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the bridge sidecar's command endpoints.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use courier_core::CourierError;

use crate::frames::{BridgeErrorBody, OpenRequest, OpenResponse, SendRequest, SendResponse};

/// Command client for one bridge sidecar. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    client: reqwest::Client,
    base_url: Url,
}

impl BridgeClient {
    /// Creates a client for the sidecar at `base_url` (e.g. `http://127.0.0.1:3001`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CourierError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CourierError::Config(format!("invalid bridge url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(CourierError::Config(format!(
                "bridge url must be http(s): {base_url}"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Messenger {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// WebSocket URL of a session's event stream.
    pub fn events_url(&self, key: &str) -> Result<Url, CourierError> {
        let mut url = self.endpoint(&["sessions", key, "events"]);
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|()| CourierError::Config(format!("cannot derive event url from {url}")))?;
        Ok(url)
    }

    /// Opens (or reattaches to) the session backed by `store`.
    pub async fn open(&self, store: &str) -> Result<OpenResponse, CourierError> {
        self.post_json(&["sessions"], &OpenRequest { store }).await
    }

    pub async fn connect(&self, key: &str) -> Result<(), CourierError> {
        self.post(&["sessions", key, "connect"], &serde_json::json!({}))
            .await
            .map(drop)
    }

    pub async fn disconnect(&self, key: &str) -> Result<(), CourierError> {
        self.post(&["sessions", key, "disconnect"], &serde_json::json!({}))
            .await
            .map(drop)
    }

    /// Sends a text and returns the wire id.
    pub async fn send_text(&self, key: &str, to: &str, text: &str) -> Result<String, CourierError> {
        let resp: SendResponse = self
            .post_json(&["sessions", key, "messages"], &SendRequest { to, text })
            .await?;
        Ok(resp.id)
    }

    async fn post_json<B, T>(&self, segments: &[&str], body: &B) -> Result<T, CourierError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post(segments, body).await?;
        let body = response.text().await.map_err(|e| CourierError::Messenger {
            message: format!("failed to read bridge response: {e}"),
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&body).map_err(|e| CourierError::Messenger {
            message: format!("failed to parse bridge response: {e}"),
            source: Some(Box::new(e)),
        })
    }

    async fn post<B>(&self, segments: &[&str], body: &B) -> Result<reqwest::Response, CourierError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments);
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| CourierError::Messenger {
                message: format!("bridge request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, url = %url, "bridge response received");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<BridgeErrorBody>(&body) {
            Ok(err) => format!("bridge returned {status}: {}", err.error),
            Err(_) => format!("bridge returned {status}: {body}"),
        };
        Err(CourierError::messenger(message))
    }
}
