// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the bridge sidecar.
//!
//! The sidecar speaks JSON over HTTP for commands and pushes session events
//! over a WebSocket, one tagged frame per text message:
//!
//! ```json
//! {"type": "connected"}
//! {"type": "qr", "code": "2@AbC..."}
//! {"type": "pair_success", "phone": "628123"}
//! {"type": "message", "id": "3EB0..", "sender": "628123", "conversation": "hi"}
//! ```

use serde::{Deserialize, Serialize};

use courier_core::{InboundText, MessageId, MessengerEvent, PairingEvent};

/// Body of `POST /sessions`.
#[derive(Debug, Serialize)]
pub struct OpenRequest<'a> {
    pub store: &'a str,
}

/// Reply to `POST /sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenResponse {
    pub key: String,
    #[serde(default)]
    pub logged_in: bool,
    #[serde(default)]
    pub device_identity: bool,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Body of `POST /sessions/{key}/messages`.
#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    pub to: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SendResponse {
    pub id: String,
}

/// Error body the sidecar returns on non-2xx replies.
#[derive(Debug, Deserialize)]
pub struct BridgeErrorBody {
    pub error: String,
}

/// One event frame pushed by the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeFrame {
    Connected,
    Disconnected,
    LoggedOut,
    Message {
        id: String,
        sender: String,
        #[serde(default)]
        conversation: Option<String>,
        #[serde(default)]
        extended_text: Option<String>,
    },
    Qr {
        code: String,
    },
    PairSuccess {
        #[serde(default)]
        phone: Option<String>,
    },
    PairTimeout,
    PairError {
        reason: String,
    },
}

/// Where a frame goes once translated.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Session(MessengerEvent),
    Pairing(PairingEvent),
}

impl BridgeFrame {
    pub fn route(self) -> Routed {
        match self {
            Self::Connected => Routed::Session(MessengerEvent::Connected),
            Self::Disconnected => Routed::Session(MessengerEvent::Disconnected),
            Self::LoggedOut => Routed::Session(MessengerEvent::LoggedOut),
            Self::Message {
                id,
                sender,
                conversation,
                extended_text,
            } => Routed::Session(MessengerEvent::Message(InboundText {
                id: MessageId(id),
                sender,
                conversation,
                extended_text,
            })),
            Self::Qr { code } => Routed::Pairing(PairingEvent::Code(code)),
            Self::PairSuccess { .. } => Routed::Pairing(PairingEvent::Success),
            Self::PairTimeout => Routed::Pairing(PairingEvent::Timeout),
            Self::PairError { reason } => Routed::Pairing(PairingEvent::Error(reason)),
        }
    }
}
