// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine fixture for unit tests: an in-memory store, mock sessions and a
//! pinned clock behind a fully started [`Core`].
//!
//! Setup touches the filesystem (session dir, account index), so tests
//! that need paused time call `tokio::time::pause()` after setup.

use std::sync::Arc;

use chrono::DateTime;
use courier_config::CourierConfig;
use courier_core::{Clock, MockClock};
use courier_test_utils::{MemoryRepository, MockFactory, MockMessenger};

use crate::accounts::session_file_name;
use crate::context::Core;

/// 2026-03-02 is a Monday.
pub(crate) const MONDAY_10AM: &str = "2026-03-02T10:00:00+07:00";

pub(crate) struct Fixture {
    pub core: Arc<Core>,
    pub factory: Arc<MockFactory>,
    pub repo: Arc<MemoryRepository>,
    pub clock: Arc<MockClock>,
    _dir: tempfile::TempDir,
}

pub(crate) async fn fixture(at: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CourierConfig::default();
    config.messenger.session_dir = dir.path().display().to_string();

    let clock = Arc::new(MockClock::new(DateTime::parse_from_rfc3339(at).unwrap()));
    let repo = Arc::new(MemoryRepository::new(clock.clone()));
    let factory = Arc::new(MockFactory::new());
    let core = Core::start(&config, repo.clone(), factory.clone(), clock.clone() as Arc<dyn Clock>)
        .await
        .unwrap();
    Fixture {
        core,
        factory,
        repo,
        clock,
        _dir: dir,
    }
}

impl Fixture {
    /// Adds and connects an account. Returns its id and mock session.
    pub async fn connected_account(&self, name: &str) -> (String, Arc<MockMessenger>) {
        let info = self.core.manager.add(name).await.unwrap();
        self.core.manager.connect(&info.id).await.unwrap();
        let session = self
            .factory
            .session(&session_file_name(&info.id))
            .unwrap();
        (info.id, session)
    }
}
