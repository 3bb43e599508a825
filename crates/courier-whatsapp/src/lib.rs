// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp-Web bridge adapter.
//!
//! The end-to-end-encrypted messenger protocol runs in a sidecar process;
//! this crate drives it over HTTP commands and a per-session WebSocket of
//! event frames, exposing it to the engine as [`MessengerFactory`] /
//! [`MessengerSession`](courier_core::MessengerSession).
//!
//! [`MessengerFactory`]: courier_core::MessengerFactory

pub mod client;
pub mod factory;
pub mod frames;
pub mod session;

pub use client::BridgeClient;
pub use factory::BridgeFactory;
pub use frames::BridgeFrame;
pub use session::BridgeSession;
