// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The send path: jitter, then one wire call.
//!
//! Callers log the message themselves, because only they know how to
//! classify it (an out-of-hours reply is logged as `away`, not `reply`).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use courier_core::{CourierError, Jid, MessageClass, MessageId};

use crate::accounts::Account;
use crate::rpc::with_deadline;
use crate::settings::Settings;

/// Whether the send path sleeps a random jitter before the wire call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep uniformly within the configured delay bounds first.
    Jitter,
    /// No delay. Broadcasts pace themselves.
    Immediate,
}

/// Performs paced text sends through an account's messenger session.
pub struct Sender {
    settings: Arc<Settings>,
    abort: CancellationToken,
    rpc_timeout: Duration,
}

impl Sender {
    /// `abort` cuts jitter sleeps short during shutdown.
    pub fn new(settings: Arc<Settings>, abort: CancellationToken, rpc_timeout: Duration) -> Self {
        Self {
            settings,
            abort,
            rpc_timeout,
        }
    }

    pub async fn send(
        &self,
        account: &Account,
        phone: &str,
        text: &str,
        class: &MessageClass,
        pacing: Pacing,
    ) -> Result<MessageId, CourierError> {
        let session = account.session();
        if !session.is_connected() {
            return Err(CourierError::messenger("not connected"));
        }

        if pacing == Pacing::Jitter {
            let delay = self.draw_delay();
            debug!(account_id = %account.id(), phone = %phone, delay_ms = delay.as_millis() as u64, "jitter before send");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.abort.cancelled() => {
                    return Err(CourierError::Unavailable("shutting down".into()));
                }
            }
        }

        let jid = Jid::from_phone(phone);
        let id = with_deadline(self.rpc_timeout, session.send_text(&jid, text)).await?;
        info!(account_id = %account.id(), phone = %phone, class = %class, message_id = %id, "message sent");
        Ok(id)
    }

    fn draw_delay(&self) -> Duration {
        let limits = self.settings.rate_limits();
        let (min, max) = if limits.max_delay_ms >= limits.min_delay_ms {
            (limits.min_delay_ms, limits.max_delay_ms)
        } else {
            (limits.min_delay_ms, limits.min_delay_ms)
        };
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}
