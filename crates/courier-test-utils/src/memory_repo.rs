// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory repository for deterministic testing.
//!
//! `MemoryRepository` never leaves the async runtime, so it is safe to use
//! under a paused tokio clock where a thread-backed store would let the
//! runtime auto-advance past RPC deadlines.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courier_core::{
    Clock, CourierError, FieldUpdate, MessageLog, MessageQuery, MessageScope, NewMessage, NewUser,
    Repository, User, UserUpdate,
};

#[derive(Default)]
struct State {
    users: Vec<User>,
    messages: Vec<MessageLog>,
    fail_next: Option<String>,
}

/// A [`Repository`] backed by two vectors.
pub struct MemoryRepository {
    state: Mutex<State>,
    clock: Arc<dyn Clock>,
}

impl MemoryRepository {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            clock,
        }
    }

    /// Makes the next repository call fail with a storage error.
    pub fn fail_next(&self, message: &str) {
        self.lock().fail_next = Some(message.to_string());
    }

    /// Every logged message, in insertion order.
    pub fn messages(&self) -> Vec<MessageLog> {
        self.lock().messages.clone()
    }

    /// Every user, in insertion order.
    pub fn users(&self) -> Vec<User> {
        self.lock().users.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn enter(&self) -> Result<MutexGuard<'_, State>, CourierError> {
        let mut state = self.lock();
        match state.fail_next.take() {
            Some(message) => Err(CourierError::storage(std::io::Error::other(message))),
            None => Ok(state),
        }
    }

    fn stamp(&self, field: &FieldUpdate<DateTime<Utc>>) -> DateTime<Utc> {
        match field {
            FieldUpdate::Set(value) => *value,
            FieldUpdate::ServerTimestamp => self.clock.now_utc(),
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>, CourierError> {
        let state = self.enter()?;
        Ok(state.users.iter().find(|u| u.phone == phone).cloned())
    }

    async fn find_user_by_phone_and_account(
        &self,
        phone: &str,
        account_id: &str,
    ) -> Result<Option<User>, CourierError> {
        let state = self.enter()?;
        Ok(state
            .users
            .iter()
            .find(|u| u.phone == phone && u.account_id.as_deref() == Some(account_id))
            .cloned())
    }

    async fn find_user(&self, id: &str) -> Result<Option<User>, CourierError> {
        let state = self.enter()?;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, CourierError> {
        let now = self.clock.now_utc();
        let mut state = self.enter()?;
        if state
            .users
            .iter()
            .any(|u| u.phone == user.phone && u.account_id == user.account_id)
        {
            return Err(CourierError::storage(std::io::Error::other(
                "UNIQUE constraint failed: users.phone, users.account_id",
            )));
        }
        let created = User {
            id: uuid::Uuid::new_v4().to_string(),
            phone: user.phone.clone(),
            name: user.name.clone(),
            notes: None,
            account_id: user.account_id.clone(),
            opt_in: true,
            blocked: false,
            last_user_message_at: None,
            last_system_sent_at: None,
            created_at: Some(now),
            updated_at: Some(now),
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn update_user(&self, id: &str, update: &UserUpdate) -> Result<(), CourierError> {
        let now = self.clock.now_utc();
        let last_user = update.last_user_message_at.as_ref().map(|f| self.stamp(f));
        let last_system = update.last_system_sent_at.as_ref().map(|f| self.stamp(f));

        let mut state = self.enter()?;
        let Some(user) = state.users.iter_mut().find(|u| u.id == id) else {
            return Ok(());
        };
        if let Some(name) = &update.name {
            user.name = Some(name.clone());
        }
        if let Some(notes) = &update.notes {
            user.notes = Some(notes.clone());
        }
        if let Some(opt_in) = update.opt_in {
            user.opt_in = opt_in;
        }
        if let Some(blocked) = update.blocked {
            user.blocked = blocked;
        }
        if last_user.is_some() {
            user.last_user_message_at = last_user;
        }
        if last_system.is_some() {
            user.last_system_sent_at = last_system;
        }
        user.updated_at = Some(now);
        Ok(())
    }

    async fn append_message(&self, message: &NewMessage) -> Result<MessageLog, CourierError> {
        let now = self.clock.now_utc();
        let mut state = self.enter()?;
        let entry = MessageLog {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: message.user_id.clone(),
            account_id: message.account_id.clone(),
            direction: message.direction,
            class: message.class.clone(),
            content: message.content.clone(),
            wa_message_id: message.wa_message_id.clone(),
            created_at: Some(now),
        };
        state.messages.push(entry.clone());
        Ok(entry)
    }

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<MessageLog>, CourierError> {
        let state = self.enter()?;
        let selected: Vec<MessageLog> = match &query.scope {
            MessageScope::All => state.messages.iter().rev().cloned().collect(),
            MessageScope::User(user_id) => state
                .messages
                .iter()
                .filter(|m| &m.user_id == user_id)
                .cloned()
                .collect(),
            MessageScope::Account(account_id) => state
                .messages
                .iter()
                .rev()
                .filter(|m| m.account_id.as_ref() == Some(account_id))
                .cloned()
                .collect(),
        };
        Ok(selected
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<User>, CourierError> {
        let state = self.enter()?;
        Ok(state.users.iter().rev().cloned().collect())
    }
}
