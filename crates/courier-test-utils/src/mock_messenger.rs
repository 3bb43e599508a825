// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock messenger session and factory for deterministic testing.
//!
//! `MockMessenger` implements `MessengerSession` with injectable inbound
//! events, a scripted pairing stream and captured outbound texts for
//! assertion in tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use courier_core::{
    CourierError, InboundText, Jid, MessageId, MessengerEvent, MessengerFactory, MessengerSession,
    OpenedSession, PairingEvent,
};

/// One captured outbound text.
#[derive(Debug, Clone, PartialEq)]
pub struct SentText {
    /// Phone digits of the recipient.
    pub to: String,
    pub text: String,
    /// Tokio time of the wire call.
    pub at: Instant,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// A scriptable messenger session.
pub struct MockMessenger {
    connected: AtomicBool,
    logged_in: AtomicBool,
    device_identity: AtomicBool,
    phone: Mutex<Option<String>>,
    events: mpsc::Sender<MessengerEvent>,
    sent: Mutex<Vec<SentText>>,
    sent_notify: Notify,
    failing: Mutex<HashSet<String>>,
    pairing_script: Mutex<Vec<PairingEvent>>,
    pending_pairing: Mutex<Option<mpsc::Sender<PairingEvent>>>,
    calls: Mutex<Vec<&'static str>>,
    next_id: AtomicUsize,
}

impl MockMessenger {
    /// A fresh, never-paired session and the receiving end of its events.
    pub fn new() -> (Arc<Self>, mpsc::Receiver<MessengerEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let session = Arc::new(Self {
            connected: AtomicBool::new(false),
            logged_in: AtomicBool::new(false),
            device_identity: AtomicBool::new(false),
            phone: Mutex::new(None),
            events: tx,
            sent: Mutex::new(Vec::new()),
            sent_notify: Notify::new(),
            failing: Mutex::new(HashSet::new()),
            pairing_script: Mutex::new(vec![
                PairingEvent::Code("code-1".into()),
                PairingEvent::Success,
            ]),
            pending_pairing: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        });
        (session, rx)
    }

    /// Marks the session as already paired to `phone`.
    pub fn set_paired(&self, phone: &str) {
        self.device_identity.store(true, Ordering::SeqCst);
        self.logged_in.store(true, Ordering::SeqCst);
        *lock(&self.phone) = Some(phone.to_string());
    }

    /// Replaces the events emitted on the next pairing stream.
    pub fn set_pairing_script(&self, script: Vec<PairingEvent>) {
        *lock(&self.pairing_script) = script;
    }

    /// Makes every send to `phone` fail.
    pub fn fail_sends_to(&self, phone: &str) {
        lock(&self.failing).insert(Jid::from_phone(phone).user().to_string());
    }

    /// Pushes an event as if the network produced it.
    pub async fn inject(&self, event: MessengerEvent) {
        let _ = self.events.send(event).await;
    }

    /// Convenience for injecting a plain text message.
    pub async fn inject_text(&self, sender: &str, text: &str) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.inject(MessengerEvent::Message(InboundText {
            id: MessageId(format!("in-{id}")),
            sender: sender.to_string(),
            conversation: Some(text.to_string()),
            extended_text: None,
        }))
        .await;
    }

    pub fn sent(&self) -> Vec<SentText> {
        lock(&self.sent).clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        lock(&self.sent).iter().map(|s| s.text.clone()).collect()
    }

    /// Waits until at least `count` texts have been sent.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<SentText> {
        loop {
            let notified = self.sent_notify.notified();
            {
                let sent = lock(&self.sent);
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            notified.await;
        }
    }

    /// Names of the lifecycle calls made so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        lock(&self.calls).clone()
    }

    fn record(&self, call: &'static str) {
        lock(&self.calls).push(call);
    }

    fn play_pairing(&self) {
        let Some(tx) = lock(&self.pending_pairing).take() else {
            return;
        };
        let script = lock(&self.pairing_script).clone();
        for event in script {
            if event == PairingEvent::Success {
                self.device_identity.store(true, Ordering::SeqCst);
                self.logged_in.store(true, Ordering::SeqCst);
            }
            let _ = tx.try_send(event);
        }
    }
}

#[async_trait]
impl MessengerSession for MockMessenger {
    async fn connect(&self) -> Result<(), CourierError> {
        self.record("connect");
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.events.try_send(MessengerEvent::Connected);
        self.play_pairing();
        Ok(())
    }

    async fn disconnect(&self) {
        self.record("disconnect");
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.events.try_send(MessengerEvent::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn has_device_identity(&self) -> bool {
        self.device_identity.load(Ordering::SeqCst)
    }

    fn own_phone(&self) -> Option<String> {
        lock(&self.phone).clone()
    }

    async fn pairing_channel(&self) -> Result<mpsc::Receiver<PairingEvent>, CourierError> {
        self.record("pairing_channel");
        if self.is_connected() {
            return Err(CourierError::messenger("pairing requested while connected"));
        }
        let capacity = lock(&self.pairing_script).len().max(1);
        let (tx, rx) = mpsc::channel(capacity);
        *lock(&self.pending_pairing) = Some(tx);
        Ok(rx)
    }

    async fn send_text(&self, to: &Jid, text: &str) -> Result<MessageId, CourierError> {
        if !self.is_connected() {
            return Err(CourierError::messenger("not connected"));
        }
        if lock(&self.failing).contains(to.user()) {
            return Err(CourierError::messenger(format!("send to {to} rejected")));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.sent).push(SentText {
            to: to.user().to_string(),
            text: text.to_string(),
            at: Instant::now(),
        });
        self.sent_notify.notify_waiters();
        Ok(MessageId(format!("mock-msg-{id}")))
    }
}

/// A [`MessengerFactory`] handing out [`MockMessenger`]s keyed by store file name.
#[derive(Default)]
pub struct MockFactory {
    sessions: Mutex<HashMap<String, Arc<MockMessenger>>>,
    paired: Mutex<HashMap<String, String>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions opened from `file_name` start paired to `phone`.
    pub fn pre_pair(&self, file_name: &str, phone: &str) {
        lock(&self.paired).insert(file_name.to_string(), phone.to_string());
    }

    /// The session most recently opened from `file_name`.
    pub fn session(&self, file_name: &str) -> Option<Arc<MockMessenger>> {
        lock(&self.sessions).get(file_name).cloned()
    }

    pub fn opened(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.sessions).keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl MessengerFactory for MockFactory {
    async fn open(&self, store: &Path) -> Result<OpenedSession, CourierError> {
        let name = store
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| CourierError::messenger("session store has no file name"))?;
        let (session, events) = MockMessenger::new();
        if let Some(phone) = lock(&self.paired).get(&name) {
            session.set_paired(phone);
        }
        lock(&self.sessions).insert(name, session.clone());
        Ok(OpenedSession { session, events })
    }
}
