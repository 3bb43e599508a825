// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded single-consumer outbound job queue.
//!
//! The queue is a pacing device, not a scheduler: jobs are taken strictly in
//! admission order and a job whose not-before lies in the future blocks every
//! job behind it until it is due.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::{
    Clock, CourierError, MessageClass, MessageId, NewMessage, Repository, UserUpdate,
};

use crate::accounts::AccountManager;
use crate::policy::{DenyReason, PolicyValidator, Verdict};
use crate::rpc::with_deadline;
use crate::sender::Pacing;

/// Called once with the final outcome of a job.
pub type CompletionHook = Box<dyn FnOnce(JobOutcome) + Send + Sync + 'static>;

/// What became of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Sent(MessageId),
    Denied(DenyReason),
    Failed(String),
    /// Abandoned because the queue was aborted during shutdown.
    Dropped,
}

/// One outbound message waiting for the worker.
pub struct Job {
    pub phone: String,
    pub text: String,
    pub class: MessageClass,
    pub not_before: DateTime<Utc>,
    /// Sending account; `None` routes through the first connected account.
    pub account_id: Option<String>,
    on_complete: Option<CompletionHook>,
}

impl Job {
    pub fn new(
        phone: impl Into<String>,
        text: impl Into<String>,
        class: MessageClass,
        not_before: DateTime<Utc>,
    ) -> Self {
        Self {
            phone: phone.into(),
            text: text.into(),
            class,
            not_before,
            account_id: None,
            on_complete: None,
        }
    }

    pub fn from_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn on_complete(mut self, hook: impl FnOnce(JobOutcome) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    fn finish(mut self, outcome: JobOutcome) {
        if let Some(hook) = self.on_complete.take() {
            hook(outcome);
        }
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("phone", &self.phone)
            .field("class", &self.class)
            .field("not_before", &self.not_before)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

/// Collaborators the worker needs for each job.
pub struct QueueDeps {
    pub policy: Arc<PolicyValidator>,
    pub manager: Arc<AccountManager>,
    pub repo: Arc<dyn Repository>,
    pub clock: Arc<dyn Clock>,
    pub rpc_timeout: Duration,
}

/// Handle to the queue and its worker.
pub struct JobQueue {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    abort: CancellationToken,
}

impl JobQueue {
    /// Spawns the worker. `abort` cuts waits short; it is cancelled when a
    /// drain overruns its deadline.
    pub fn start(capacity: usize, deps: QueueDeps, abort: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = Worker {
            deps,
            abort: abort.clone(),
        };
        let handle = tokio::spawn(worker.run(rx));
        info!(capacity, "job queue started");
        Self {
            tx: Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(handle)),
            abort,
        }
    }

    /// Admits a job, waiting only for channel back-pressure.
    pub async fn enqueue(&self, job: Job) -> Result<(), CourierError> {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| CourierError::Unavailable("queue stopped".into()))?;
        debug!(phone = %job.phone, class = %job.class, "job enqueued");
        tx.send(job)
            .await
            .map_err(|_| CourierError::Unavailable("queue stopped".into()))
    }

    pub fn is_stopped(&self) -> bool {
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).is_none()
    }

    /// Closes the input and waits for the worker to drain.
    ///
    /// If draining takes longer than `drain_timeout` the worker is aborted:
    /// the job in hand stops waiting and the rest are dropped.
    pub async fn stop(&self, drain_timeout: Duration) {
        drop(self.tx.lock().unwrap_or_else(|p| p.into_inner()).take());
        let Some(mut handle) = self.worker.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(drain_timeout, &mut handle).await {
            Ok(_) => info!("job queue drained"),
            Err(_) => {
                warn!(timeout = ?drain_timeout, "job queue drain timed out, dropping remaining jobs");
                self.abort.cancel();
                let _ = handle.await;
            }
        }
    }
}

struct Worker {
    deps: QueueDeps,
    abort: CancellationToken,
}

impl Worker {
    async fn run(self, mut rx: mpsc::Receiver<Job>) {
        while let Some(job) = rx.recv().await {
            if self.abort.is_cancelled() {
                warn!(phone = %job.phone, class = %job.class, "dropping job");
                job.finish(JobOutcome::Dropped);
                continue;
            }
            let outcome = self.process(&job).await;
            match &outcome {
                JobOutcome::Sent(id) => {
                    debug!(phone = %job.phone, message_id = %id, "job sent");
                }
                JobOutcome::Denied(reason) => {
                    warn!(phone = %job.phone, class = %job.class, reason = %reason, "job denied by policy");
                }
                JobOutcome::Failed(e) => {
                    warn!(phone = %job.phone, class = %job.class, error = %e, "job send failed");
                }
                JobOutcome::Dropped => {
                    warn!(phone = %job.phone, class = %job.class, "dropping job");
                }
            }
            job.finish(outcome);
        }
        debug!("job queue worker exited");
    }

    async fn process(&self, job: &Job) -> JobOutcome {
        if !self.wait_until(job.not_before).await {
            return JobOutcome::Dropped;
        }

        if let Verdict::Deny(reason) = self.deps.policy.validate(&job.class, &job.phone).await {
            return JobOutcome::Denied(reason);
        }

        let account = match self.deps.manager.route(job.account_id.as_deref()).await {
            Ok(account) => account,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        let id = match self
            .deps
            .manager
            .send_from(&account, &job.phone, &job.text, &job.class, Pacing::Jitter)
            .await
        {
            Ok(id) => id,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };

        if job.class == MessageClass::System {
            self.record_system_send(job, account.id(), &id).await;
        }
        JobOutcome::Sent(id)
    }

    /// Sleeps until `not_before`. Returns false if aborted first.
    async fn wait_until(&self, not_before: DateTime<Utc>) -> bool {
        let Ok(wait) = (not_before - self.deps.clock.now_utc()).to_std() else {
            return true;
        };
        if wait.is_zero() {
            return true;
        }
        debug!(wait_ms = wait.as_millis() as u64, "job not yet due");
        tokio::select! {
            _ = tokio::time::sleep(wait) => true,
            _ = self.abort.cancelled() => false,
        }
    }

    async fn record_system_send(&self, job: &Job, account_id: &str, id: &MessageId) {
        let timeout = self.deps.rpc_timeout;
        let user = match with_deadline(timeout, self.deps.repo.find_user_by_phone(&job.phone)).await {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                warn!(phone = %job.phone, error = %e, "user lookup after system send failed");
                return;
            }
        };
        if let Err(e) = with_deadline(
            timeout,
            self.deps
                .repo
                .update_user(&user.id, &UserUpdate::touch_last_system_sent()),
        )
        .await
        {
            warn!(user_id = %user.id, error = %e, "failed to stamp last system send");
        }
        let entry = NewMessage::outgoing(
            &user.id,
            Some(account_id),
            MessageClass::System,
            &job.text,
            Some(id),
        );
        if let Err(e) = with_deadline(timeout, self.deps.repo.append_message(&entry)).await {
            warn!(user_id = %user.id, error = %e, "failed to log system send");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixture, MONDAY_10AM};
    use courier_core::NewUser;
    use tokio::sync::oneshot;
    use tokio::time::Instant;

    async fn seed_user(repo: &dyn Repository, phone: &str) {
        repo.create_user(&NewUser {
            phone: phone.into(),
            account_id: Some("acc".into()),
            name: None,
        })
        .await
        .unwrap();
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn worker_future_can_be_spawned() {
        let f = fixture(MONDAY_10AM).await;
        let worker = Worker {
            deps: QueueDeps {
                policy: f.core.policy.clone(),
                manager: f.core.manager.clone(),
                repo: f.core.repo.clone(),
                clock: f.core.clock.clone(),
                rpc_timeout: f.core.rpc_timeout(),
            },
            abort: CancellationToken::new(),
        };
        let (_tx, rx) = mpsc::channel::<Job>(1);
        let job = Job::new("+621", "x", MessageClass::Manual, f.clock.now_utc()).on_complete(|_| {});
        assert_send(&worker.process(&job));
        assert_send(&worker.run(rx));
    }

    #[tokio::test]
    async fn not_before_blocks_later_jobs() {
        let f = fixture(MONDAY_10AM).await;
        let (_, session) = f.connected_account("Main").await;
        tokio::time::pause();
        let now = f.clock.now_utc();

        f.core
            .queue
            .enqueue(Job::new("+621", "first", MessageClass::Manual, now + chrono::Duration::seconds(5)))
            .await
            .unwrap();
        f.core
            .queue
            .enqueue(Job::new("+622", "second", MessageClass::Manual, now))
            .await
            .unwrap();

        let start = Instant::now();
        let sent = session.wait_for_sent(2).await;
        assert_eq!(sent[0].text, "first");
        assert_eq!(sent[1].text, "second");
        assert!(sent[0].at - start >= Duration::from_secs(5));
        assert!(sent[1].at > sent[0].at);
    }

    #[tokio::test]
    async fn system_send_updates_cap_and_log_then_second_is_denied() {
        let f = fixture(MONDAY_10AM).await;
        let (account, session) = f.connected_account("Main").await;
        seed_user(f.repo.as_ref(), "+6281").await;
        tokio::time::pause();
        let now = f.clock.now_utc();

        let (tx, rx) = oneshot::channel();
        f.core
            .queue
            .enqueue(
                Job::new("+6281", "notice", MessageClass::System, now)
                    .on_complete(move |o| {
                        let _ = tx.send(o);
                    }),
            )
            .await
            .unwrap();
        assert!(matches!(rx.await.unwrap(), JobOutcome::Sent(_)));
        assert_eq!(session.sent_texts(), vec!["notice"]);

        let user = &f.repo.users()[0];
        assert!(user.last_system_sent_at.is_some());
        let log = f.repo.messages();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].class, MessageClass::System);
        assert_eq!(log[0].account_id.as_deref(), Some(account.as_str()));

        let (tx, rx) = oneshot::channel();
        f.core
            .queue
            .enqueue(
                Job::new("+6281", "again", MessageClass::System, now)
                    .on_complete(move |o| {
                        let _ = tx.send(o);
                    }),
            )
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), JobOutcome::Denied(DenyReason::DailyCap));
        assert_eq!(session.sent().len(), 1);
    }

    #[tokio::test]
    async fn no_connected_account_fails_the_job() {
        let f = fixture(MONDAY_10AM).await;
        let (tx, rx) = oneshot::channel();
        f.core
            .queue
            .enqueue(
                Job::new("+6281", "hi", MessageClass::Manual, f.clock.now_utc())
                    .on_complete(move |o| {
                        let _ = tx.send(o);
                    }),
            )
            .await
            .unwrap();
        match rx.await.unwrap() {
            JobOutcome::Failed(e) => assert!(e.contains("No connected account available")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn enqueue_after_stop_is_unavailable() {
        let f = fixture(MONDAY_10AM).await;
        f.core.queue.stop(Duration::from_secs(1)).await;
        assert!(f.core.queue.is_stopped());
        let err = f
            .core
            .queue
            .enqueue(Job::new("+62", "x", MessageClass::Manual, f.clock.now_utc()))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Unavailable(_)));
    }

    #[tokio::test]
    async fn overrunning_drain_drops_waiting_jobs() {
        let f = fixture(MONDAY_10AM).await;
        let (_, session) = f.connected_account("Main").await;
        tokio::time::pause();
        let later = f.clock.now_utc() + chrono::Duration::hours(1);

        let (tx, rx) = oneshot::channel();
        f.core
            .queue
            .enqueue(
                Job::new("+621", "late", MessageClass::Manual, later).on_complete(move |o| {
                    let _ = tx.send(o);
                }),
            )
            .await
            .unwrap();

        f.core.queue.stop(Duration::from_secs(2)).await;
        assert_eq!(rx.await.unwrap(), JobOutcome::Dropped);
        assert!(session.sent().is_empty());
    }
}
