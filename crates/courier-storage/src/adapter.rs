// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`Repository`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{
    Clock, CourierError, MessageLog, MessageQuery, NewMessage, NewUser, Repository, User,
    UserUpdate,
};
use tracing::debug;

use crate::database::{format_ts, Database};
use crate::queries;

/// Local row store backed by SQLite.
///
/// "Server-side" timestamps are taken from the injected clock at the moment
/// the statement is issued.
pub struct SqliteRepository {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteRepository {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Open the database file at `path` and wrap it.
    pub async fn open(path: &str, clock: Arc<dyn Clock>) -> Result<Self, CourierError> {
        Ok(Self::new(Database::open(path).await?, clock))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn now(&self) -> String {
        format_ts(self.clock.now_utc())
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, CourierError> {
        queries::users::find_by_phone(&self.db, phone).await
    }

    async fn find_user_by_phone_and_account(
        &self,
        phone: &str,
        account_id: &str,
    ) -> Result<Option<User>, CourierError> {
        queries::users::find_by_phone_and_account(&self.db, phone, account_id).await
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, CourierError> {
        queries::users::find_by_id(&self.db, id).await
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, CourierError> {
        let id = uuid::Uuid::new_v4().to_string();
        debug!(user_id = %id, phone = %user.phone, "creating user");
        queries::users::insert_user(&self.db, id, user, self.now()).await
    }

    async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<(), CourierError> {
        let touched = queries::users::update_user(&self.db, id, update, self.now()).await?;
        if touched == 0 && !update.is_empty() {
            debug!(user_id = %id, "update matched no user");
        }
        Ok(())
    }

    async fn append_message(&self, message: &NewMessage) -> Result<MessageLog, CourierError> {
        let id = uuid::Uuid::new_v4().to_string();
        queries::messages::insert_message(&self.db, id, message, self.now()).await
    }

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageLog>, CourierError> {
        queries::messages::list_messages(&self.db, query).await
    }

    async fn list_users(&self) -> Result<Vec<User>, CourierError> {
        queries::users::list_users(&self.db).await
    }
}
