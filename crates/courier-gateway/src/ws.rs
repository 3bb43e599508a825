// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket pairing channel.
//!
//! Server -> Client (JSON):
//! ```json
//! {"type": "qr", "code": "2@AbC..."}
//! {"type": "success"}
//! {"type": "timeout"}
//! {"type": "error", "code": "reason"}
//! {"type": "connected"}
//! ```
//!
//! Codes stream until one terminal frame, then the socket closes. A session
//! that is already logged in gets a single `connected` frame. Client frames
//! are ignored apart from close.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use courier_core::{CourierError, PairingEvent};
use courier_engine::Pairing;

use crate::auth::bearer_from_headers;
use crate::server::GatewayState;

/// One server-to-client pairing frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PairingFrame {
    Qr { code: String },
    Success,
    Timeout,
    Error { code: String },
    Connected,
}

impl From<PairingEvent> for PairingFrame {
    fn from(event: PairingEvent) -> Self {
        match event {
            PairingEvent::Code(code) => Self::Qr { code },
            PairingEvent::Success => Self::Success,
            PairingEvent::Timeout => Self::Timeout,
            PairingEvent::Error(code) => Self::Error { code },
        }
    }
}

/// `?token=` for clients that cannot set an Authorization header.
#[derive(Debug, Default, Deserialize)]
pub struct WsAuth {
    #[serde(default)]
    pub token: Option<String>,
}

enum Target {
    Account(String),
    Default,
}

fn authorized(state: &GatewayState, headers: &HeaderMap, query: &WsAuth) -> bool {
    let presented = bearer_from_headers(headers).or(query.token.as_deref());
    state.auth.permits(presented)
}

/// GET /api/accounts/{id}/qr
pub async fn account_pairing(
    ws: WebSocketUpgrade,
    Path(id): Path<String>,
    Query(query): Query<WsAuth>,
    headers: HeaderMap,
    State(state): State<GatewayState>,
) -> Response {
    if !authorized(&state, &headers, &query) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, Target::Account(id)))
}

/// GET /api/qr
///
/// Single-account mode: pairs the `default` account, creating it if absent.
pub async fn default_pairing(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuth>,
    headers: HeaderMap,
    State(state): State<GatewayState>,
) -> Response {
    if !authorized(&state, &headers, &query) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, Target::Default))
}

async fn start_pairing(
    state: &GatewayState,
    target: Target,
) -> Result<(String, Pairing), CourierError> {
    let manager = &state.core.manager;
    let id = match target {
        Target::Account(id) => id,
        Target::Default => manager.ensure_default().await?.id().to_string(),
    };
    let pairing = manager.pairing(&id).await?;
    Ok((id, pairing))
}

async fn handle_socket(socket: WebSocket, state: GatewayState, target: Target) {
    let (mut sink, stream) = socket.split();

    match start_pairing(&state, target).await {
        Ok((id, Pairing::AlreadyLoggedIn)) => {
            debug!(account_id = %id, "pairing requested for a logged-in account");
            let _ = send_frame(&mut sink, &PairingFrame::Connected).await;
        }
        Ok((id, Pairing::Stream(events))) => {
            info!(account_id = %id, "waiting for pairing code");
            relay(&id, events, &mut sink, stream).await;
        }
        Err(e) => {
            warn!(error = %e, "failed to start pairing");
            let _ = send_frame(
                &mut sink,
                &PairingFrame::Error {
                    code: e.to_string(),
                },
            )
            .await;
        }
    }
    let _ = sink.close().await;
}

/// Forwards pairing events until a terminal one, or until either side goes away.
async fn relay(
    account_id: &str,
    mut events: mpsc::Receiver<PairingEvent>,
    sink: &mut SplitSink<WebSocket, Message>,
    mut stream: futures::stream::SplitStream<WebSocket>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    warn!(account_id = %account_id, "pairing channel closed without an outcome");
                    let frame = PairingFrame::Error {
                        code: "pairing channel closed".into(),
                    };
                    let _ = send_frame(sink, &frame).await;
                    return;
                };
                let terminal = event.is_terminal();
                let frame = PairingFrame::from(event);
                if send_frame(sink, &frame).await.is_err() {
                    debug!(account_id = %account_id, "pairing client went away");
                    return;
                }
                if terminal {
                    info!(account_id = %account_id, outcome = ?frame, "pairing finished");
                    return;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    debug!(account_id = %account_id, "pairing client disconnected");
                    return;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

async fn send_frame(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: &PairingFrame,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sink.send(Message::Text(text.into())).await
}
