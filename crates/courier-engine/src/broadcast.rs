// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast registry and runner.
//!
//! A broadcast fans one text across a recipient list from a single account,
//! one send at a time, pausing at least [`BROADCAST_FLOOR_MS`] between sends.
//! Broadcasts are approved by the operator who creates them, so sends bypass
//! the policy gate and go straight to the account manager.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use courier_config::validation::BROADCAST_FLOOR_MS;
use courier_core::{Clock, CourierError, MessageClass};

use crate::accounts::AccountManager;
use crate::sender::Pacing;

/// Inter-send delay used when the operator asks for none.
pub const DEFAULT_BROADCAST_DELAY_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BroadcastStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
}

impl BroadcastStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Broadcast {
    pub id: String,
    pub name: String,
    pub message: String,
    pub account_id: String,
    pub recipients: Vec<String>,
    pub sent: usize,
    pub failed: usize,
    pub total: usize,
    pub status: BroadcastStatus,
    pub delay_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Operator input for a new broadcast.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBroadcast {
    pub name: String,
    pub message: String,
    pub account_id: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
}

/// Owns every broadcast record and the stop tokens of the running ones.
pub struct BroadcastRegistry {
    records: Mutex<HashMap<String, Broadcast>>,
    running: Mutex<HashMap<String, CancellationToken>>,
    manager: Arc<AccountManager>,
    clock: Arc<dyn Clock>,
    floor: Duration,
}

impl BroadcastRegistry {
    /// `min_delay_ms` can raise the pacing floor but never lower it.
    pub fn new(manager: Arc<AccountManager>, clock: Arc<dyn Clock>, min_delay_ms: u64) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            running: Mutex::new(HashMap::new()),
            manager,
            clock,
            floor: Duration::from_millis(min_delay_ms.max(BROADCAST_FLOOR_MS)),
        }
    }

    fn records(&self) -> MutexGuard<'_, HashMap<String, Broadcast>> {
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn running(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.running.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn create(&self, input: NewBroadcast) -> Result<Broadcast, CourierError> {
        if input.name.trim().is_empty()
            || input.message.trim().is_empty()
            || input.account_id.trim().is_empty()
        {
            return Err(CourierError::Validation(
                "name, message and account_id are required".into(),
            ));
        }
        let recipients: Vec<String> = input
            .recipients
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(CourierError::Validation("recipients must not be empty".into()));
        }

        let broadcast = Broadcast {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            name: input.name,
            message: input.message,
            account_id: input.account_id,
            total: recipients.len(),
            recipients,
            sent: 0,
            failed: 0,
            status: BroadcastStatus::Pending,
            delay_ms: input
                .delay_ms
                .filter(|d| *d > 0)
                .unwrap_or(DEFAULT_BROADCAST_DELAY_MS),
            created_at: self.clock.now_utc(),
        };
        self.records()
            .insert(broadcast.id.clone(), broadcast.clone());
        info!(broadcast_id = %broadcast.id, total = broadcast.total, "broadcast created");
        Ok(broadcast)
    }

    /// All broadcasts, newest first.
    pub fn list(&self) -> Vec<Broadcast> {
        let mut all: Vec<Broadcast> = self.records().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn get(&self, id: &str) -> Result<Broadcast, CourierError> {
        self.records()
            .get(id)
            .cloned()
            .ok_or_else(|| CourierError::not_found("broadcast", id))
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running().contains_key(id)
    }

    /// Starts the runner. Starting a running broadcast changes nothing.
    pub fn start(self: &Arc<Self>, id: &str) -> Result<Broadcast, CourierError> {
        let (token, snapshot) = {
            let mut running = self.running();
            let mut records = self.records();
            let record = records
                .get_mut(id)
                .ok_or_else(|| CourierError::not_found("broadcast", id))?;
            if running.contains_key(id) || record.status == BroadcastStatus::Running {
                return Ok(record.clone());
            }
            if record.status.is_finished() {
                return Err(CourierError::Validation("broadcast already finished".into()));
            }
            record.status = BroadcastStatus::Running;
            record.sent = 0;
            record.failed = 0;
            let token = CancellationToken::new();
            running.insert(id.to_string(), token.clone());
            (token, record.clone())
        };

        let registry = self.clone();
        let id = id.to_string();
        tokio::spawn(async move { registry.run(&id, token).await });
        Ok(snapshot)
    }

    /// Stops a broadcast, keeping the counters it reached.
    pub fn cancel(&self, id: &str) -> Result<Broadcast, CourierError> {
        let token = self.running().remove(id);
        if let Some(token) = token {
            token.cancel();
        }
        let mut records = self.records();
        let record = records
            .get_mut(id)
            .ok_or_else(|| CourierError::not_found("broadcast", id))?;
        if !record.status.is_finished() {
            record.status = BroadcastStatus::Cancelled;
            info!(broadcast_id = %id, sent = record.sent, failed = record.failed, "broadcast cancelled");
        }
        Ok(record.clone())
    }

    /// Cancels if running, then forgets the broadcast.
    pub fn delete(&self, id: &str) -> Result<(), CourierError> {
        self.cancel(id)?;
        self.records().remove(id);
        info!(broadcast_id = %id, "broadcast deleted");
        Ok(())
    }

    pub fn cancel_all(&self) {
        let tokens: Vec<(String, CancellationToken)> = self.running().drain().collect();
        for (id, token) in tokens {
            token.cancel();
            if let Some(record) = self.records().get_mut(&id) {
                record.status = BroadcastStatus::Cancelled;
            }
        }
    }

    async fn run(&self, id: &str, stop: CancellationToken) {
        let Ok(broadcast) = self.get(id) else {
            return;
        };
        let delay = Duration::from_millis(broadcast.delay_ms).max(self.floor);
        info!(
            broadcast_id = %id,
            name = %broadcast.name,
            total = broadcast.total,
            delay_ms = delay.as_millis() as u64,
            "broadcast started"
        );

        let last = broadcast.recipients.len().saturating_sub(1);
        for (i, phone) in broadcast.recipients.iter().enumerate() {
            if stop.is_cancelled() {
                return;
            }
            let result = self
                .manager
                .send_message_from(
                    &broadcast.account_id,
                    phone,
                    &broadcast.message,
                    &MessageClass::Manual,
                    Pacing::Immediate,
                )
                .await;
            self.publish(id, |record| match &result {
                Ok(_) => record.sent += 1,
                Err(e) => {
                    warn!(broadcast_id = %id, phone = %phone, error = %e, "broadcast send failed");
                    record.failed += 1;
                }
            });

            if i < last {
                tokio::select! {
                    _ = stop.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        self.running().remove(id);
        self.publish(id, |record| {
            if record.status == BroadcastStatus::Running {
                record.status = BroadcastStatus::Completed;
                info!(broadcast_id = %record.id, sent = record.sent, failed = record.failed, "broadcast completed");
            }
        });
    }

    fn publish(&self, id: &str, update: impl FnOnce(&mut Broadcast)) {
        if let Some(record) = self.records().get_mut(id) {
            update(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, MONDAY_10AM};

    fn input(account_id: &str, recipients: &[&str], delay_ms: Option<u64>) -> NewBroadcast {
        NewBroadcast {
            name: "promo".into(),
            message: "hello all".into(),
            account_id: account_id.into(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
            delay_ms,
        }
    }

    async fn wait_for_status(registry: &BroadcastRegistry, id: &str, status: BroadcastStatus) {
        for _ in 0..1000 {
            if registry.get(id).unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("broadcast {id} never reached {status}");
    }

    #[tokio::test]
    async fn create_validates_and_defaults_delay() {
        let f = fixture(MONDAY_10AM).await;
        let registry = &f.core.broadcasts;
        assert!(matches!(
            registry.create(input("", &["+621"], None)),
            Err(CourierError::Validation(_))
        ));
        assert!(matches!(
            registry.create(input("acc", &[" "], None)),
            Err(CourierError::Validation(_))
        ));

        let b = registry.create(input("acc", &["+621", "+622"], Some(0))).unwrap();
        assert_eq!(b.delay_ms, DEFAULT_BROADCAST_DELAY_MS);
        assert_eq!(b.total, 2);
        assert_eq!(b.status, BroadcastStatus::Pending);
        assert_eq!(b.id.len(), 8);
        assert!(matches!(
            registry.start("missing"),
            Err(CourierError::NotFound { kind: "broadcast", .. })
        ));
    }

    #[tokio::test]
    async fn pacing_never_drops_below_floor() {
        let f = fixture(MONDAY_10AM).await;
        let (account, session) = f.connected_account("Main").await;
        tokio::time::pause();

        let b = f
            .core
            .broadcasts
            .create(input(&account, &["+621", "+622", "+623", "+624"], Some(100)))
            .unwrap();
        f.core.broadcasts.start(&b.id).unwrap();

        let sent = session.wait_for_sent(4).await;
        for pair in sent.windows(2) {
            assert!(pair[1].at - pair[0].at >= Duration::from_millis(3000));
        }
        let to: Vec<&str> = sent.iter().map(|s| s.to.as_str()).collect();
        assert_eq!(to, vec!["621", "622", "623", "624"]);

        wait_for_status(&f.core.broadcasts, &b.id, BroadcastStatus::Completed).await;
        let done = f.core.broadcasts.get(&b.id).unwrap();
        assert_eq!(done.sent + done.failed, done.total);
        assert!(!f.core.broadcasts.is_running(&b.id));
    }

    #[tokio::test]
    async fn failures_are_counted_not_fatal() {
        let f = fixture(MONDAY_10AM).await;
        let (account, session) = f.connected_account("Main").await;
        session.fail_sends_to("+622");
        tokio::time::pause();

        let b = f
            .core
            .broadcasts
            .create(input(&account, &["+621", "+622", "+623"], None))
            .unwrap();
        f.core.broadcasts.start(&b.id).unwrap();
        wait_for_status(&f.core.broadcasts, &b.id, BroadcastStatus::Completed).await;

        let done = f.core.broadcasts.get(&b.id).unwrap();
        assert_eq!((done.sent, done.failed, done.total), (2, 1, 3));
    }

    #[tokio::test]
    async fn cancel_stops_the_runner_and_keeps_counters() {
        let f = fixture(MONDAY_10AM).await;
        let (account, session) = f.connected_account("Main").await;
        tokio::time::pause();

        let b = f
            .core
            .broadcasts
            .create(input(&account, &["+621", "+622", "+623", "+624"], Some(100)))
            .unwrap();
        f.core.broadcasts.start(&b.id).unwrap();
        session.wait_for_sent(1).await;
        while f.core.broadcasts.get(&b.id).unwrap().sent < 1 {
            tokio::task::yield_now().await;
        }

        let second = f.core.broadcasts.start(&b.id).unwrap();
        assert_eq!(second.status, BroadcastStatus::Running);
        assert_eq!(second.sent, 1, "second start is a no-op");

        let cancelled = f.core.broadcasts.cancel(&b.id).unwrap();
        assert_eq!(cancelled.status, BroadcastStatus::Cancelled);
        assert_eq!(cancelled.sent, 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let after = f.core.broadcasts.get(&b.id).unwrap();
        assert_eq!(after.status, BroadcastStatus::Cancelled);
        assert!(after.sent <= 2);
        assert_eq!(session.sent().len(), after.sent);

        assert!(matches!(
            f.core.broadcasts.start(&b.id),
            Err(CourierError::Validation(_))
        ));
        f.core.broadcasts.delete(&b.id).unwrap();
        assert!(f.core.broadcasts.get(&b.id).is_err());
    }

    #[tokio::test]
    async fn unknown_account_fails_every_recipient() {
        let f = fixture(MONDAY_10AM).await;
        tokio::time::pause();
        let b = f
            .core
            .broadcasts
            .create(input("nope", &["+621", "+622"], None))
            .unwrap();
        f.core.broadcasts.start(&b.id).unwrap();
        wait_for_status(&f.core.broadcasts, &b.id, BroadcastStatus::Completed).await;
        let done = f.core.broadcasts.get(&b.id).unwrap();
        assert_eq!((done.sent, done.failed), (0, 2));
    }
}
