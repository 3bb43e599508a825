// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messenger session traits for the external end-to-end-encrypted messenger library.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CourierError;
use crate::types::{Jid, MessageId, MessengerEvent, PairingEvent};

/// One live messenger session bound to a persistent session store.
#[async_trait]
pub trait MessengerSession: Send + Sync {
    /// Opens the transport. Emits [`MessengerEvent::Connected`] once established.
    async fn connect(&self) -> Result<(), CourierError>;

    /// Closes the transport. Idempotent.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    fn is_logged_in(&self) -> bool;

    /// Whether the session store already holds a paired device identity.
    fn has_device_identity(&self) -> bool;

    /// Phone number of the paired device, once known.
    fn own_phone(&self) -> Option<String>;

    /// Requests a fresh pairing stream.
    ///
    /// Must be called while disconnected; events only flow after the next
    /// [`connect`](Self::connect). The caller exclusively owns the receiver.
    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingEvent>, CourierError>;

    /// Sends a plain text message and returns its wire id.
    async fn send_text(&self, to: &Jid, text: &str) -> Result<MessageId, CourierError>;
}

/// A session together with the single subscription to its events.
pub struct OpenedSession {
    pub session: Arc<dyn MessengerSession>,
    pub events: mpsc::Receiver<MessengerEvent>,
}

/// Opens sessions from on-disk stores. Opening does not connect.
#[async_trait]
pub trait MessengerFactory: Send + Sync {
    async fn open(&self, store: &Path) -> Result<OpenedSession, CourierError>;
}
