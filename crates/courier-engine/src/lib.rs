// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Messaging engine for the Courier backend.
//!
//! The [`Core`] context ties together:
//! - the settings registry and the policy validator
//! - the paced send path and the inbound auto-reply handler
//! - the account manager with one event pump per session
//! - the job queue, the scheduler and the broadcast runner
//!
//! Everything is constructed once at startup and shut down in order by
//! [`Core::shutdown`].

pub mod accounts;
pub mod broadcast;
pub mod context;
pub mod inbound;
pub mod policy;
pub mod queue;
pub mod scheduler;
pub mod sender;
pub mod settings;
pub mod shutdown;
pub mod tables;

mod rpc;

#[cfg(test)]
mod testing;

pub use accounts::{Account, AccountInfo, AccountManager, Pairing};
pub use broadcast::{Broadcast, BroadcastRegistry, BroadcastStatus, NewBroadcast};
pub use context::Core;
pub use policy::{DenyReason, PolicyValidator, Verdict, VerdictView};
pub use queue::{Job, JobOutcome, JobQueue};
pub use rpc::with_deadline;
pub use sender::{Pacing, Sender};
pub use settings::{Settings, SettingsPatch, SettingsSnapshot};
pub use tables::{KeywordTable, ScheduledMessage, ScheduledStatus, ScheduledTable, Template, TemplateTable};
