// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier messaging backend.
//!
//! This crate provides the error type, the domain types and the adapter
//! traits (row store, messenger session) that every other Courier crate
//! builds on.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, MockClock, SystemClock};
pub use error::CourierError;
pub use types::{
    Direction, FieldUpdate, InboundText, Jid, MessageClass, MessageId, MessageLog, MessageQuery,
    MessageScope, MessengerEvent, NewMessage, NewUser, PairingEvent, User, UserUpdate,
};

pub use traits::{MessengerFactory, MessengerSession, OpenedSession, Repository};
