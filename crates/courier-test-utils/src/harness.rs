// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` starts a complete engine [`Core`] with mock messenger
//! sessions, a pinned clock and either an in-memory or a temp SQLite row
//! store. Session stores live in a temp directory removed on drop.

use std::sync::Arc;

use chrono::DateTime;
use courier_config::CourierConfig;
use courier_core::{Clock, CourierError, MessengerEvent, MockClock, Repository};
use courier_engine::accounts::session_file_name;
use courier_engine::Core;
use courier_storage::SqliteRepository;

use crate::memory_repo::MemoryRepository;
use crate::mock_messenger::{MockFactory, MockMessenger};

/// Monday 2026-03-02, mid-morning local time: inside default operating hours.
pub const DEFAULT_START: &str = "2026-03-02T10:00:00+07:00";

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    start: String,
    sqlite: bool,
    config: CourierConfig,
    pre_paired: Vec<(String, String)>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            start: DEFAULT_START.to_string(),
            sqlite: false,
            config: CourierConfig::default(),
            pre_paired: Vec::new(),
        }
    }

    /// Pin the clock to an RFC 3339 instant.
    pub fn with_start(mut self, rfc3339: &str) -> Self {
        self.start = rfc3339.to_string();
        self
    }

    /// Use a temp SQLite store instead of the in-memory repository.
    ///
    /// SQLite calls run on a background thread, so do not combine this
    /// with paused tokio time.
    pub fn with_sqlite(mut self) -> Self {
        self.sqlite = true;
        self
    }

    /// Adjust the configuration before the engine starts.
    pub fn with_config(mut self, edit: impl FnOnce(&mut CourierConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Make the session store of `account_id` open already paired.
    pub fn with_paired_session(mut self, account_id: &str, phone: &str) -> Self {
        self.pre_paired
            .push((session_file_name(account_id), phone.to_string()));
        self
    }

    /// Build the harness, starting the engine.
    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let temp_dir = tempfile::TempDir::new().map_err(CourierError::storage)?;
        let mut config = self.config;
        config.messenger.session_dir = temp_dir.path().join("sessions").display().to_string();
        config.store.database_path = temp_dir.path().join("test.db").display().to_string();

        let start = DateTime::parse_from_rfc3339(&self.start)
            .map_err(|e| CourierError::Config(format!("bad harness start time: {e}")))?;
        let clock = Arc::new(MockClock::new(start));

        let (repo, memory): (Arc<dyn Repository>, Option<Arc<MemoryRepository>>) = if self.sqlite {
            let repo = SqliteRepository::open(&config.store.database_path, clock.clone()).await?;
            (Arc::new(repo), None)
        } else {
            let memory = Arc::new(MemoryRepository::new(clock.clone()));
            (memory.clone(), Some(memory))
        };

        let factory = Arc::new(MockFactory::new());
        for (file, phone) in &self.pre_paired {
            factory.pre_pair(file, phone);
        }

        let core = Core::start(&config, repo.clone(), factory.clone(), clock.clone() as Arc<dyn Clock>).await?;
        Ok(TestHarness {
            core,
            factory,
            repo,
            memory,
            clock,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A running engine with mock sessions and temp storage.
pub struct TestHarness {
    pub core: Arc<Core>,
    /// Hands out the mock session behind each account.
    pub factory: Arc<MockFactory>,
    pub repo: Arc<dyn Repository>,
    /// Set when the harness uses the in-memory store.
    pub memory: Option<Arc<MemoryRepository>>,
    pub clock: Arc<MockClock>,
    pub config: CourierConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// The mock session of an account.
    pub fn session(&self, account_id: &str) -> Option<Arc<MockMessenger>> {
        self.factory.session(&session_file_name(account_id))
    }

    /// Adds an account and connects it. Returns its id and mock session.
    pub async fn connected_account(
        &self,
        name: &str,
    ) -> Result<(String, Arc<MockMessenger>), CourierError> {
        let info = self.core.manager.add(name).await?;
        self.core.manager.connect(&info.id).await?;
        let session = self
            .session(&info.id)
            .ok_or_else(|| CourierError::Internal(format!("no session for {}", info.id)))?;
        Ok((info.id, session))
    }

    /// Delivers an inbound text to an account as if the network sent it.
    pub async fn inject_text(&self, account_id: &str, sender: &str, text: &str) {
        if let Some(session) = self.session(account_id) {
            session.inject_text(sender, text).await;
        }
    }

    /// Delivers a raw messenger event to an account.
    pub async fn inject(&self, account_id: &str, event: MessengerEvent) {
        if let Some(session) = self.session(account_id) {
            session.inject(event).await;
        }
    }

    pub async fn shutdown(&self) {
        self.core.shutdown().await;
    }
}
