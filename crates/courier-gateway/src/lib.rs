// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket administration gateway.
//!
//! Exposes the engine under `/api`: settings, users and the message log,
//! operator sends, keywords, templates, scheduled messages, broadcasts and
//! account management, plus the WebSocket pairing channel. Handlers hold
//! only an `Arc<Core>`; every state change goes through the engine.

pub mod accounts;
pub mod auth;
pub mod broadcasts;
pub mod error;
pub mod handlers;
pub mod server;
pub mod ws;

pub use auth::AuthConfig;
pub use error::{ApiError, ErrorResponse};
pub use server::{router, serve, start_server, GatewayState, ServerConfig};
pub use ws::PairingFrame;
