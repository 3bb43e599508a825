// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wall-clock abstraction.
//!
//! Operating hours are evaluated in local time, so the clock hands out
//! offset-bearing timestamps rather than bare UTC.

use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, Local, Utc};

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// The host clock in the host's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock pinned to a chosen instant that advances with tokio time.
///
/// Under a paused tokio runtime it only moves when tokio's clock does, which
/// keeps wall-clock decisions and timer-driven sleeps consistent in tests.
#[derive(Debug)]
pub struct MockClock {
    inner: Mutex<(DateTime<FixedOffset>, tokio::time::Instant)>,
}

impl MockClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            inner: Mutex::new((start, tokio::time::Instant::now())),
        }
    }

    /// Jump to a new instant.
    pub fn set(&self, to: DateTime<FixedOffset>) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        *inner = (to, tokio::time::Instant::now());
    }

    /// Jump forward without moving tokio time.
    pub fn advance(&self, by: chrono::Duration) {
        let now = self.now();
        self.set(now + by);
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let elapsed = inner.1.elapsed();
        inner.0 + chrono::Duration::from_std(elapsed).unwrap_or_default()
    }
}
