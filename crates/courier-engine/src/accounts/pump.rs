// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-account event pump.
//!
//! One task consumes an account's event subscription. Connection events
//! update the account flags inline; text messages go to a worker per sender
//! so one sender's messages are handled strictly in arrival order while
//! different senders proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::{InboundText, MessengerEvent};

use super::Account;
use crate::inbound::InboundHandler;

/// A sender worker with nothing in hand and no traffic for this long is dropped.
pub const SENDER_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);
const SENDER_BACKLOG: usize = 32;

struct SenderWorker {
    tx: mpsc::Sender<InboundText>,
    /// Messages handed to the worker and not yet fully handled.
    pending: Arc<AtomicUsize>,
    last_seen: Instant,
}

impl SenderWorker {
    fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0 && self.last_seen.elapsed() >= SENDER_IDLE_TIMEOUT
    }
}

/// Per-sender workers of one account.
///
/// Only the pump touches the map, so a worker seen with nothing pending
/// cannot receive anything before its handle is dropped.
struct SenderWorkers {
    account: Arc<Account>,
    inbound: Arc<InboundHandler>,
    workers: HashMap<String, SenderWorker>,
}

impl SenderWorkers {
    fn new(account: Arc<Account>, inbound: Arc<InboundHandler>) -> Self {
        Self {
            account,
            inbound,
            workers: HashMap::new(),
        }
    }

    /// Hands a message to its sender's worker without waiting. A full
    /// backlog drops the message so one busy sender cannot stall the pump.
    fn dispatch(&mut self, message: InboundText) {
        let sender = message.sender.clone();
        let message = match self.workers.get_mut(&sender) {
            Some(worker) => {
                worker.pending.fetch_add(1, Ordering::SeqCst);
                match worker.tx.try_send(message) {
                    Ok(()) => {
                        worker.last_seen = Instant::now();
                        return;
                    }
                    Err(TrySendError::Full(dropped)) => {
                        worker.pending.fetch_sub(1, Ordering::SeqCst);
                        warn!(
                            account_id = %self.account.id(),
                            phone = %sender,
                            message_id = %dropped.id,
                            backlog = SENDER_BACKLOG,
                            "sender backlog full, dropping inbound message"
                        );
                        return;
                    }
                    // Worker ended; start a fresh one below.
                    Err(TrySendError::Closed(message)) => message,
                }
            }
            None => message,
        };

        let (tx, rx) = mpsc::channel(SENDER_BACKLOG);
        let pending = Arc::new(AtomicUsize::new(1));
        tokio::spawn(run_sender_worker(
            self.account.clone(),
            self.inbound.clone(),
            rx,
            pending.clone(),
        ));
        if tx.try_send(message).is_err() {
            warn!(account_id = %self.account.id(), phone = %sender, "sender worker exited before first message");
            return;
        }
        self.workers.insert(
            sender,
            SenderWorker {
                tx,
                pending,
                last_seen: Instant::now(),
            },
        );
    }

    fn prune_idle(&mut self) {
        let before = self.workers.len();
        self.workers
            .retain(|_, w| !w.tx.is_closed() && !w.is_idle());
        let pruned = before - self.workers.len();
        if pruned > 0 {
            debug!(account_id = %self.account.id(), pruned, "pruned idle sender workers");
        }
    }
}

pub(crate) fn spawn_pump(
    account: Arc<Account>,
    events: mpsc::Receiver<MessengerEvent>,
    inbound: Arc<InboundHandler>,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(run_pump(account, events, inbound, stop))
}

async fn run_pump(
    account: Arc<Account>,
    mut events: mpsc::Receiver<MessengerEvent>,
    inbound: Arc<InboundHandler>,
    stop: CancellationToken,
) {
    let mut workers = SenderWorkers::new(account.clone(), inbound);
    let mut prune = tokio::time::interval_at(Instant::now() + PRUNE_INTERVAL, PRUNE_INTERVAL);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = prune.tick() => workers.prune_idle(),
            event = events.recv() => match event {
                None => break,
                Some(MessengerEvent::Connected) => {
                    account.set_connected(true);
                    account.refresh();
                    info!(account_id = %account.id(), name = %account.name(), "account connected");
                }
                Some(MessengerEvent::Disconnected) => {
                    account.set_connected(false);
                    info!(account_id = %account.id(), "account disconnected");
                }
                Some(MessengerEvent::LoggedOut) => {
                    account.set_logged_in(false);
                    warn!(account_id = %account.id(), "account logged out");
                }
                Some(MessengerEvent::Message(message)) => workers.dispatch(message),
            }
        }
    }
    debug!(account_id = %account.id(), "event pump stopped");
}

async fn run_sender_worker(
    account: Arc<Account>,
    inbound: Arc<InboundHandler>,
    mut rx: mpsc::Receiver<InboundText>,
    pending: Arc<AtomicUsize>,
) {
    while let Some(message) = rx.recv().await {
        inbound.handle(&account, message).await;
        pending.fetch_sub(1, Ordering::SeqCst);
    }
}
