// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier messaging backend.

use thiserror::Error;

/// The primary error type used across all Courier adapter traits and engine operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Row-store errors (connection, query failure, decoding).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Messenger session errors (not connected, transport failure, rejected send).
    #[error("messenger error: {message}")]
    Messenger {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Bad input from an API client.
    #[error("validation error: {0}")]
    Validation(String),

    /// The policy validator refused a send.
    #[error("policy denied: {reason}")]
    PolicyDenied { reason: String },

    /// Unknown account, user, broadcast, template or scheduled id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A required resource is not currently available (no connected account, queue stopped).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Wraps any error as a [`CourierError::Storage`].
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Builds a [`CourierError::Messenger`] without an underlying source.
    pub fn messenger(message: impl Into<String>) -> Self {
        Self::Messenger {
            message: message.into(),
            source: None,
        }
    }

    /// Builds a [`CourierError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}
