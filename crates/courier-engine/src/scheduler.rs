// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic promotion of due scheduled messages into the job queue.
//!
//! A due row moves `pending -> queued` when handed over; the queue reports
//! the final `sent` or `failed` through the job's completion hook.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::{Clock, MessageClass};

use crate::queue::{Job, JobOutcome, JobQueue};
use crate::tables::{ScheduledStatus, ScheduledTable};

/// The background scheduler driver.
pub struct Scheduler {
    stop: CancellationToken,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Starts ticking every `interval`; the first scan happens one interval in.
    pub fn start(
        table: Arc<ScheduledTable>,
        queue: Arc<JobQueue>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        promote_due(&table, &queue, clock.as_ref()).await;
                    }
                }
            }
            debug!("scheduler loop exited");
        });
        info!(interval_secs = interval.as_secs(), "scheduler started");
        Self {
            stop,
            handle: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    /// Stops the ticker. No rows are promoted after this returns.
    pub async fn stop(&self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
            info!("scheduler stopped");
        }
    }
}

/// One scan: every pending row due at or before now becomes a system job.
/// Returns how many rows were handed to the queue.
pub async fn promote_due(table: &Arc<ScheduledTable>, queue: &JobQueue, clock: &dyn Clock) -> usize {
    let now = clock.now_utc();
    let due = table.take_due(now);
    let mut queued = 0;
    for row in due {
        let hook_table = table.clone();
        let id = row.id.clone();
        let job = Job::new(&row.phone, &row.message, MessageClass::System, now).on_complete(
            move |outcome| {
                let status = match outcome {
                    JobOutcome::Sent(_) => ScheduledStatus::Sent,
                    _ => ScheduledStatus::Failed,
                };
                hook_table.set_status(&id, status);
            },
        );
        match queue.enqueue(job).await {
            Ok(()) => {
                queued += 1;
                debug!(scheduled_id = %row.id, phone = %row.phone, "scheduled message queued");
            }
            Err(e) => {
                warn!(scheduled_id = %row.id, error = %e, "failed to queue scheduled message");
                table.set_status(&row.id, ScheduledStatus::Failed);
            }
        }
    }
    if queued > 0 {
        info!(count = queued, "scheduled messages queued");
    }
    queued
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, MONDAY_10AM};
    use courier_core::{NewUser, Repository};

    #[tokio::test]
    async fn due_row_is_sent_on_next_tick() {
        let f = fixture(MONDAY_10AM).await;
        let (_, session) = f.connected_account("Main").await;
        f.repo
            .create_user(&NewUser {
                phone: "+6281".into(),
                account_id: None,
                name: None,
            })
            .await
            .unwrap();
        tokio::time::pause();

        let row = f
            .core
            .scheduled
            .add("+6281", "reminder", "2026-03-02T10:00:00+07:00", f.clock.now_utc())
            .unwrap();
        assert_eq!(f.core.scheduled.get(&row.id).unwrap().status, ScheduledStatus::Pending);

        let sent = session.wait_for_sent(1).await;
        assert_eq!(sent[0].text, "reminder");
        for _ in 0..100 {
            if f.core.scheduled.get(&row.id).unwrap().status == ScheduledStatus::Sent {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.core.scheduled.get(&row.id).unwrap().status, ScheduledStatus::Sent);
    }

    #[tokio::test]
    async fn denied_row_ends_failed() {
        let f = fixture(MONDAY_10AM).await;
        f.connected_account("Main").await;
        tokio::time::pause();

        // No user row for this phone, so the system gate refuses it.
        let row = f
            .core
            .scheduled
            .add("+6299", "reminder", "2026-03-02T09:00:00+07:00", f.clock.now_utc())
            .unwrap();
        assert_eq!(
            promote_due(&f.core.scheduled, &f.core.queue, f.clock.as_ref()).await,
            1
        );
        for _ in 0..100 {
            if f.core.scheduled.get(&row.id).unwrap().status == ScheduledStatus::Failed {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(f.core.scheduled.get(&row.id).unwrap().status, ScheduledStatus::Failed);
    }

    #[tokio::test]
    async fn future_rows_stay_pending_and_stop_is_final() {
        let f = fixture(MONDAY_10AM).await;
        tokio::time::pause();
        let row = f
            .core
            .scheduled
            .add("+6281", "later", "2026-03-03T10:00:00+07:00", f.clock.now_utc())
            .unwrap();
        assert_eq!(
            promote_due(&f.core.scheduled, &f.core.queue, f.clock.as_ref()).await,
            0
        );

        f.core.scheduler.stop().await;
        f.clock.advance(chrono::Duration::days(2));
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.core.scheduled.get(&row.id).unwrap().status, ScheduledStatus::Pending);
    }

    #[tokio::test]
    async fn stopped_queue_marks_row_failed() {
        let f = fixture(MONDAY_10AM).await;
        f.core.queue.stop(Duration::from_secs(1)).await;
        let row = f
            .core
            .scheduled
            .add("+6281", "x", "2026-03-02T09:00:00+07:00", f.clock.now_utc())
            .unwrap();
        assert_eq!(
            promote_due(&f.core.scheduled, &f.core.queue, f.clock.as_ref()).await,
            0
        );
        assert_eq!(f.core.scheduled.get(&row.id).unwrap().status, ScheduledStatus::Failed);
    }
}
