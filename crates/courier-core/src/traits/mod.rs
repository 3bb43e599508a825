// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions at the seams the engine depends on.
//!
//! All adapters use `#[async_trait]` for dynamic dispatch compatibility.

pub mod messenger;
pub mod repository;

pub use messenger::{MessengerFactory, MessengerSession, OpenedSession};
pub use repository::Repository;
