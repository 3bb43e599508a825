// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine context: every long-lived component, built once at startup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use courier_config::CourierConfig;
use courier_core::{Clock, CourierError, MessengerFactory, Repository};

use crate::accounts::AccountManager;
use crate::broadcast::BroadcastRegistry;
use crate::inbound::InboundHandler;
use crate::policy::PolicyValidator;
use crate::queue::{JobQueue, QueueDeps};
use crate::scheduler::Scheduler;
use crate::sender::Sender;
use crate::settings::Settings;
use crate::tables::{KeywordTable, ScheduledTable, TemplateTable};

/// Shared engine state handed to the gateway and the serve loop.
pub struct Core {
    pub settings: Arc<Settings>,
    pub keywords: Arc<KeywordTable>,
    pub templates: Arc<TemplateTable>,
    pub scheduled: Arc<ScheduledTable>,
    pub repo: Arc<dyn Repository>,
    pub policy: Arc<PolicyValidator>,
    pub manager: Arc<AccountManager>,
    pub queue: Arc<JobQueue>,
    pub scheduler: Scheduler,
    pub broadcasts: Arc<BroadcastRegistry>,
    pub clock: Arc<dyn Clock>,
    rpc_timeout: Duration,
    drain_timeout: Duration,
}

impl Core {
    /// Builds and starts the engine.
    ///
    /// Settings come first, then the account manager (which restores and
    /// reconnects stored sessions), then the queue worker and scheduler.
    pub async fn start(
        config: &CourierConfig,
        repo: Arc<dyn Repository>,
        factory: Arc<dyn MessengerFactory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, CourierError> {
        let rpc_timeout = Duration::from_secs(config.engine.rpc_timeout_secs);
        let abort = CancellationToken::new();

        let settings = Arc::new(Settings::from_config(&config.policy, &config.bot, clock.clone()));
        let keywords = Arc::new(KeywordTable::new(config.bot.keywords.iter()));
        let policy = Arc::new(PolicyValidator::new(
            repo.clone(),
            settings.clone(),
            clock.clone(),
            rpc_timeout,
        ));
        let sender = Arc::new(Sender::new(settings.clone(), abort.clone(), rpc_timeout));
        let inbound = Arc::new(InboundHandler::new(
            repo.clone(),
            settings.clone(),
            keywords.clone(),
            sender.clone(),
            rpc_timeout,
        ));

        let session_dir = PathBuf::from(&config.messenger.session_dir);
        tokio::fs::create_dir_all(&session_dir)
            .await
            .map_err(|e| CourierError::Config(format!("cannot create session dir {}: {e}", session_dir.display())))?;
        let manager = Arc::new(AccountManager::new(
            factory,
            session_dir,
            sender,
            inbound,
            clock.clone(),
            rpc_timeout,
        ));
        manager.restore().await?;
        manager.connect_all().await;

        let queue = Arc::new(JobQueue::start(
            config.engine.queue_capacity,
            QueueDeps {
                policy: policy.clone(),
                manager: manager.clone(),
                repo: repo.clone(),
                clock: clock.clone(),
                rpc_timeout,
            },
            abort,
        ));
        let scheduled = Arc::new(ScheduledTable::default());
        let scheduler = Scheduler::start(
            scheduled.clone(),
            queue.clone(),
            clock.clone(),
            Duration::from_secs(config.engine.scheduler_interval_secs),
        );
        let broadcasts = Arc::new(BroadcastRegistry::new(
            manager.clone(),
            clock.clone(),
            config.engine.broadcast_min_delay_ms,
        ));

        info!("engine started");
        Ok(Arc::new(Self {
            settings,
            keywords,
            templates: Arc::new(TemplateTable::default()),
            scheduled,
            repo,
            policy,
            manager,
            queue,
            scheduler,
            broadcasts,
            clock,
            rpc_timeout,
            drain_timeout: Duration::from_secs(config.engine.drain_timeout_secs),
        }))
    }

    /// Deadline applied to every row-store and messenger call.
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Ordered drain: scheduler, queue, broadcasts, then every session.
    ///
    /// Callers stop accepting operator requests before calling this.
    pub async fn shutdown(&self) {
        info!("engine shutting down");
        self.scheduler.stop().await;
        self.queue.stop(self.drain_timeout).await;
        self.broadcasts.cancel_all();
        self.manager.shutdown().await;
        info!("engine stopped");
    }
}
