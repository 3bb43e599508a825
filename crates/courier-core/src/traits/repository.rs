// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repository trait over the durable user and message-log records.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::types::{MessageLog, MessageQuery, NewMessage, NewUser, User, UserUpdate};

/// Narrow interface over the external row store.
///
/// Implementations must be safe to share across tasks. Every method may fail
/// with [`CourierError::Storage`]; callers treat that as deny/abort and do
/// not retry.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Finds the first user with this phone on any account.
    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, CourierError>;

    /// Finds the user keyed by (phone, account).
    async fn find_user_by_phone_and_account(
        &self,
        phone: &str,
        account_id: &str,
    ) -> Result<Option<User>, CourierError>;

    async fn find_user(&self, id: &str) -> Result<Option<User>, CourierError>;

    /// Creates a user with defaults (opted in, not blocked).
    async fn create_user(&self, user: &NewUser) -> Result<User, CourierError>;

    /// Applies a partial update. Unknown ids are not an error.
    async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<(), CourierError>;

    /// Appends a message-log entry and returns it as stored.
    async fn append_message(&self, message: &NewMessage) -> Result<MessageLog, CourierError>;

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageLog>, CourierError>;

    /// Lists all users, most recently active first.
    async fn list_users(&self) -> Result<Vec<User>, CourierError>;
}
