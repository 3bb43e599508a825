// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the repository, messenger and engine layers.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Wire identifier assigned to a message by the messenger network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Policy-relevant category of a message.
///
/// Parsing never fails: strings outside the known set become
/// [`MessageClass::Unknown`] so the policy validator can refuse them
/// with a precise reason instead of the caller guessing a default.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(from = "String", into = "String")]
pub enum MessageClass {
    /// Inbound text written by the end user.
    User,
    /// Automatic keyword reply.
    Reply,
    /// Operator-initiated send.
    Manual,
    /// System-initiated notification, subject to hours and the daily cap.
    System,
    /// Out-of-hours auto-reply.
    Away,
    Promo,
    Broadcast,
    Blast,
    #[strum(default)]
    Unknown(String),
}

impl MessageClass {
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::Reply => "reply",
            Self::Manual => "manual",
            Self::System => "system",
            Self::Away => "away",
            Self::Promo => "promo",
            Self::Broadcast => "broadcast",
            Self::Blast => "blast",
            Self::Unknown(s) => s,
        }
    }

    /// Bulk classes are never allowed through the per-message policy path.
    pub fn is_bulk(&self) -> bool {
        matches!(self, Self::Promo | Self::Broadcast | Self::Blast)
    }
}

impl From<String> for MessageClass {
    fn from(s: String) -> Self {
        s.trim().parse().unwrap_or(Self::Unknown(s))
    }
}

impl From<MessageClass> for String {
    fn from(class: MessageClass) -> Self {
        class.as_str().to_string()
    }
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a logged message relative to this process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// A durable end-user record, unique per (phone, account).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub phone: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default = "default_true")]
    pub opt_in: bool,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub last_user_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_system_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Input for lazily creating a user row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewUser {
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A single column assignment in a partial update.
///
/// `ServerTimestamp` asks the store to stamp the column with its own clock,
/// which keeps a legitimate literal value from ever being mistaken for a
/// "stamp now" request.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate<T> {
    Set(T),
    ServerTimestamp,
}

/// Partial update of a [`User`]. `None` fields are left untouched.
///
/// Only the operator-editable fields deserialize from API input; the
/// bookkeeping timestamps are set by the engine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub opt_in: Option<bool>,
    #[serde(default)]
    pub blocked: Option<bool>,
    #[serde(skip)]
    pub last_user_message_at: Option<FieldUpdate<DateTime<Utc>>>,
    #[serde(skip)]
    pub last_system_sent_at: Option<FieldUpdate<DateTime<Utc>>>,
}

impl UserUpdate {
    pub fn opt_in(value: bool) -> Self {
        Self {
            opt_in: Some(value),
            ..Self::default()
        }
    }

    /// Stamp `last_user_message_at` with the store's clock.
    pub fn touch_last_user_message() -> Self {
        Self {
            last_user_message_at: Some(FieldUpdate::ServerTimestamp),
            ..Self::default()
        }
    }

    /// Stamp `last_system_sent_at` with the store's clock.
    pub fn touch_last_system_sent() -> Self {
        Self {
            last_system_sent_at: Some(FieldUpdate::ServerTimestamp),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Input for appending a message-log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub user_id: String,
    pub account_id: Option<String>,
    pub direction: Direction,
    pub class: MessageClass,
    pub content: String,
    pub wa_message_id: Option<String>,
}

impl NewMessage {
    pub fn incoming(user_id: &str, account_id: &str, content: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            account_id: Some(account_id.to_string()),
            direction: Direction::Incoming,
            class: MessageClass::User,
            content: content.to_string(),
            wa_message_id: None,
        }
    }

    pub fn outgoing(
        user_id: &str,
        account_id: Option<&str>,
        class: MessageClass,
        content: &str,
        wa_message_id: Option<&MessageId>,
    ) -> Self {
        Self {
            user_id: user_id.to_string(),
            account_id: account_id.map(str::to_string),
            direction: Direction::Outgoing,
            class,
            content: content.to_string(),
            wa_message_id: wa_message_id.map(|id| id.0.clone()),
        }
    }
}

/// An append-only message-log entry as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageLog {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    pub direction: Direction,
    #[serde(rename = "message_type")]
    pub class: MessageClass,
    pub content: String,
    #[serde(default)]
    pub wa_message_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Which slice of the message log to list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageScope {
    /// Every message, newest first.
    All,
    /// One user's conversation, oldest first.
    User(String),
    /// Everything handled by one account, newest first.
    Account(String),
}

/// Paginated message-log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub scope: MessageScope,
    pub limit: usize,
    pub offset: usize,
}

impl MessageQuery {
    pub fn new(scope: MessageScope, limit: usize, offset: usize) -> Self {
        Self {
            scope,
            limit,
            offset,
        }
    }
}

/// Messenger-native address of a phone number (`<digits>@s.whatsapp.net`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid(String);

impl Jid {
    pub const USER_SERVER: &'static str = "s.whatsapp.net";

    /// Keeps only the digits of `phone`, so `+62 812-1` and `628121` address the same user.
    pub fn from_phone(phone: &str) -> Self {
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        Self(format!("{digits}@{}", Self::USER_SERVER))
    }

    /// The user part (phone digits) of the address.
    pub fn user(&self) -> &str {
        self.0.split('@').next().unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A text message received by one account.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundText {
    pub id: MessageId,
    /// Sender phone number (user part of the sender address).
    pub sender: String,
    /// Plain conversation body.
    pub conversation: Option<String>,
    /// Body of an extended-text message (links, quotes).
    pub extended_text: Option<String>,
}

impl InboundText {
    /// The plain body if present, else the extended-text body. `None` for non-text events.
    pub fn text(&self) -> Option<&str> {
        self.conversation
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.extended_text.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Events emitted by a messenger session.
#[derive(Debug, Clone, PartialEq)]
pub enum MessengerEvent {
    Connected,
    Disconnected,
    LoggedOut,
    Message(InboundText),
}

/// Events on a pairing channel. Every stream ends with exactly one terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A (rotated) pairing code to render as a QR image.
    Code(String),
    Success,
    Timeout,
    Error(String),
}

impl PairingEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Code(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_class_parses_known_and_unknown() {
        assert_eq!("system".parse::<MessageClass>().unwrap(), MessageClass::System);
        assert_eq!("MANUAL".parse::<MessageClass>().unwrap(), MessageClass::Manual);
        assert_eq!(MessageClass::from(" Away ".to_string()), MessageClass::Away);
        assert_eq!(
            "newsletter".parse::<MessageClass>().unwrap(),
            MessageClass::Unknown("newsletter".into())
        );
        assert!(MessageClass::Blast.is_bulk());
        assert!(!MessageClass::Reply.is_bulk());
    }

    #[test]
    fn message_class_serializes_as_wire_string() {
        let json = serde_json::to_string(&MessageClass::Away).unwrap();
        assert_eq!(json, "\"away\"");
        let parsed: MessageClass = serde_json::from_str("\"promo\"").unwrap();
        assert_eq!(parsed, MessageClass::Promo);
    }

    #[test]
    fn direction_is_lowercase() {
        assert_eq!(Direction::Incoming.to_string(), "incoming");
        assert_eq!("outgoing".parse::<Direction>().unwrap(), Direction::Outgoing);
        assert_eq!(
            serde_json::to_string(&Direction::Outgoing).unwrap(),
            "\"outgoing\""
        );
    }

    #[test]
    fn jid_strips_formatting() {
        let jid = Jid::from_phone("+62 812-3456");
        assert_eq!(jid.as_str(), "628123456@s.whatsapp.net");
        assert_eq!(jid.user(), "628123456");
    }

    #[test]
    fn inbound_text_prefers_conversation() {
        let mut msg = InboundText {
            id: MessageId("m1".into()),
            sender: "6281".into(),
            conversation: Some("hi".into()),
            extended_text: Some("ext".into()),
        };
        assert_eq!(msg.text(), Some("hi"));

        msg.conversation = Some(String::new());
        assert_eq!(msg.text(), Some("ext"));

        msg.extended_text = None;
        assert_eq!(msg.text(), None);
    }

    #[test]
    fn user_deserializes_store_timestamps() {
        let json = r#"{
            "id": "u1",
            "phone": "6281",
            "account_id": "acc1",
            "opt_in": true,
            "blocked": false,
            "last_system_sent_at": "2026-03-02T10:00:00.123456+07:00"
        }"#;
        let user: User = serde_json::from_str(json).unwrap();
        let ts = user.last_system_sent_at.unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-03-02T03:00:00.123456+00:00");
        assert!(user.last_user_message_at.is_none());
    }

    #[test]
    fn user_update_api_input_ignores_bookkeeping() {
        let update: UserUpdate =
            serde_json::from_str(r#"{"blocked": true, "notes": "vip"}"#).unwrap();
        assert_eq!(update.blocked, Some(true));
        assert_eq!(update.notes.as_deref(), Some("vip"));
        assert!(update.last_system_sent_at.is_none());
        assert!(!update.is_empty());
        assert!(UserUpdate::default().is_empty());
    }

    #[test]
    fn pairing_terminal_events() {
        assert!(!PairingEvent::Code("abc".into()).is_terminal());
        assert!(PairingEvent::Success.is_terminal());
        assert!(PairingEvent::Error("x".into()).is_terminal());
    }
}
