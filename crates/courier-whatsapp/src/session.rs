// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A messenger session hosted by the bridge sidecar.
//!
//! Commands go over HTTP. While connected, a reader task holds the
//! session's event socket and fans frames out to the session event channel
//! and the pending pairing stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::{CourierError, Jid, MessageId, MessengerEvent, MessengerSession, PairingEvent};

use crate::client::BridgeClient;
use crate::frames::{BridgeFrame, OpenResponse, Routed};

const PAIRING_CAPACITY: usize = 16;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// Flags mirrored from the sidecar's frames.
#[derive(Debug, Default)]
struct SessionState {
    connected: AtomicBool,
    logged_in: AtomicBool,
    device_identity: AtomicBool,
    phone: Mutex<Option<String>>,
    pairing: Mutex<Option<mpsc::Sender<PairingEvent>>>,
}

impl SessionState {
    fn from_open(opened: &OpenResponse) -> Self {
        Self {
            logged_in: AtomicBool::new(opened.logged_in),
            device_identity: AtomicBool::new(opened.device_identity),
            phone: Mutex::new(opened.phone.clone()),
            ..Self::default()
        }
    }

    async fn apply(&self, frame: BridgeFrame, events: &mpsc::Sender<MessengerEvent>) {
        match &frame {
            BridgeFrame::Connected => self.connected.store(true, Ordering::SeqCst),
            BridgeFrame::Disconnected => self.connected.store(false, Ordering::SeqCst),
            BridgeFrame::LoggedOut => {
                self.logged_in.store(false, Ordering::SeqCst);
                self.device_identity.store(false, Ordering::SeqCst);
                *lock(&self.phone) = None;
            }
            BridgeFrame::PairSuccess { phone } => {
                self.logged_in.store(true, Ordering::SeqCst);
                self.device_identity.store(true, Ordering::SeqCst);
                if let Some(phone) = phone {
                    *lock(&self.phone) = Some(phone.clone());
                }
            }
            _ => {}
        }

        match frame.route() {
            Routed::Session(event) => {
                if events.send(event).await.is_err() {
                    debug!("session event receiver dropped");
                }
            }
            Routed::Pairing(event) => {
                let listener = if event.is_terminal() {
                    lock(&self.pairing).take()
                } else {
                    lock(&self.pairing).clone()
                };
                match listener {
                    Some(tx) => {
                        let _ = tx.send(event).await;
                    }
                    None => debug!(?event, "pairing frame without a listener"),
                }
            }
        }
    }

    /// Ends a pending pairing stream so it still sees a terminal event.
    async fn abandon_pairing(&self, reason: &str) {
        let pending = lock(&self.pairing).take();
        if let Some(tx) = pending {
            let _ = tx.send(PairingEvent::Error(reason.to_string())).await;
        }
    }
}

struct Reader {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// [`MessengerSession`] backed by one bridge sidecar session.
pub struct BridgeSession {
    client: BridgeClient,
    key: String,
    state: Arc<SessionState>,
    events: mpsc::Sender<MessengerEvent>,
    reader: tokio::sync::Mutex<Option<Reader>>,
}

impl BridgeSession {
    pub(crate) fn new(
        client: BridgeClient,
        opened: &OpenResponse,
        events: mpsc::Sender<MessengerEvent>,
    ) -> Self {
        Self {
            client,
            key: opened.key.clone(),
            state: Arc::new(SessionState::from_open(opened)),
            events,
            reader: tokio::sync::Mutex::new(None),
        }
    }

    /// The sidecar's key for this session.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl MessengerSession for BridgeSession {
    async fn connect(&self) -> Result<(), CourierError> {
        let mut reader = self.reader.lock().await;
        if reader.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Ok(());
        }

        // Subscribe before connecting so the first frames are not lost.
        let url = self.client.events_url(&self.key)?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| CourierError::Messenger {
                message: format!("failed to open event stream: {e}"),
                source: Some(Box::new(e)),
            })?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(read_frames(
            self.key.clone(),
            stream,
            self.state.clone(),
            self.events.clone(),
            cancel.clone(),
        ));

        if let Err(e) = self.client.connect(&self.key).await {
            cancel.cancel();
            let _ = handle.await;
            return Err(e);
        }

        info!(key = %self.key, "bridge session connecting");
        *reader = Some(Reader { cancel, handle });
        Ok(())
    }

    async fn disconnect(&self) {
        let reader = self.reader.lock().await.take();
        if let Some(reader) = reader {
            reader.cancel.cancel();
            let _ = reader.handle.await;
        }
        if let Err(e) = self.client.disconnect(&self.key).await {
            warn!(key = %self.key, error = %e, "bridge disconnect failed");
        }
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.state.logged_in.load(Ordering::SeqCst)
    }

    fn has_device_identity(&self) -> bool {
        self.state.device_identity.load(Ordering::SeqCst)
    }

    fn own_phone(&self) -> Option<String> {
        lock(&self.state.phone).clone()
    }

    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingEvent>, CourierError> {
        if self.is_connected() {
            return Err(CourierError::messenger("pairing requested while connected"));
        }
        let (tx, rx) = mpsc::channel(PAIRING_CAPACITY);
        *lock(&self.state.pairing) = Some(tx);
        Ok(rx)
    }

    async fn send_text(&self, to: &Jid, text: &str) -> Result<MessageId, CourierError> {
        if !self.is_connected() {
            return Err(CourierError::messenger("not connected"));
        }
        let id = self.client.send_text(&self.key, to.as_str(), text).await?;
        Ok(MessageId(id))
    }
}

async fn read_frames<S>(
    key: String,
    mut stream: S,
    state: Arc<SessionState>,
    events: mpsc::Sender<MessengerEvent>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<BridgeFrame>(&text) {
                    Ok(frame) => state.apply(frame, &events).await,
                    Err(e) => warn!(key = %key, error = %e, "ignoring malformed bridge frame"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    debug!(key = %key, "bridge closed the event stream");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(key = %key, error = %e, "bridge event stream failed");
                    break;
                }
            }
        }
    }

    if state.connected.swap(false, Ordering::SeqCst) {
        let _ = events.send(MessengerEvent::Disconnected).await;
    }
    state.abandon_pairing("event stream closed").await;
}
