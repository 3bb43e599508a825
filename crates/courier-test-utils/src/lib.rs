// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a messenger network or a hosted row store.
//!
//! # Components
//!
//! - [`MockMessenger`] - Scriptable messenger session with event injection and send capture
//! - [`MockFactory`] - Hands out mock sessions keyed by session store file
//! - [`MemoryRepository`] - In-memory row store, safe under paused tokio time
//! - [`TestHarness`] - A fully started engine wired to the mocks above

pub mod harness;
pub mod memory_repo;
pub mod mock_messenger;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use memory_repo::MemoryRepository;
pub use mock_messenger::{MockFactory, MockMessenger, SentText};
