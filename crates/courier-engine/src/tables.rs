// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory operator tables: keyword replies, templates and scheduled messages.
//!
//! None of these survive a restart. Each table has its own lock.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use courier_core::CourierError;

fn poisoned<T>(p: std::sync::PoisonError<T>) -> T {
    p.into_inner()
}

/// Normalized keyword form: trimmed and lowercased.
pub fn normalize_keyword(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Trigger word to response text.
#[derive(Debug, Default)]
pub struct KeywordTable {
    entries: RwLock<BTreeMap<String, String>>,
}

impl KeywordTable {
    pub fn new<I, K, V>(seed: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let entries = seed
            .into_iter()
            .map(|(k, v)| (normalize_keyword(k.as_ref()), v.into()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Looks up a normalized key.
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.entries.read().unwrap_or_else(poisoned).get(key).cloned()
    }

    pub fn insert(&self, keyword: &str, response: &str) -> Result<(), CourierError> {
        let key = normalize_keyword(keyword);
        if key.is_empty() || response.trim().is_empty() {
            return Err(CourierError::Validation(
                "keyword and response are required".into(),
            ));
        }
        self.entries
            .write()
            .unwrap_or_else(poisoned)
            .insert(key, response.to_string());
        Ok(())
    }

    /// Case-insensitive removal. Returns whether anything was removed.
    pub fn remove(&self, keyword: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(poisoned)
            .remove(&normalize_keyword(keyword))
            .is_some()
    }

    pub fn all(&self) -> BTreeMap<String, String> {
        self.entries.read().unwrap_or_else(poisoned).clone()
    }
}

/// Named reusable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TemplateTable {
    entries: RwLock<Vec<Template>>,
}

impl TemplateTable {
    pub fn list(&self) -> Vec<Template> {
        self.entries.read().unwrap_or_else(poisoned).clone()
    }

    pub fn add(&self, name: &str, content: &str, now: DateTime<Utc>) -> Result<Template, CourierError> {
        if name.trim().is_empty() || content.trim().is_empty() {
            return Err(CourierError::Validation("name and content are required".into()));
        }
        let template = Template {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            content: content.to_string(),
            created_at: now,
        };
        self.entries
            .write()
            .unwrap_or_else(poisoned)
            .push(template.clone());
        Ok(template)
    }

    pub fn remove(&self, id: &str) -> Result<(), CourierError> {
        let mut entries = self.entries.write().unwrap_or_else(poisoned);
        let before = entries.len();
        entries.retain(|t| t.id != id);
        if entries.len() == before {
            return Err(CourierError::not_found("template", id));
        }
        Ok(())
    }
}

/// Lifecycle of a scheduled message.
///
/// `Queued` means handed to the job queue; the queue reports the final
/// `Sent` or `Failed` back once the send attempt resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScheduledStatus {
    Pending,
    Queued,
    Sent,
    Failed,
}

/// A one-shot system message due at `scheduled_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledMessage {
    pub id: String,
    pub phone: String,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduledStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ScheduledTable {
    entries: Mutex<Vec<ScheduledMessage>>,
}

impl ScheduledTable {
    fn lock(&self) -> MutexGuard<'_, Vec<ScheduledMessage>> {
        self.entries.lock().unwrap_or_else(poisoned)
    }

    pub fn list(&self) -> Vec<ScheduledMessage> {
        self.lock().clone()
    }

    /// Adds a pending row. `scheduled_at` must be RFC 3339 with an offset.
    pub fn add(
        &self,
        phone: &str,
        message: &str,
        scheduled_at: &str,
        now: DateTime<Utc>,
    ) -> Result<ScheduledMessage, CourierError> {
        if phone.trim().is_empty() || message.trim().is_empty() {
            return Err(CourierError::Validation("phone and message are required".into()));
        }
        let due = DateTime::parse_from_rfc3339(scheduled_at.trim()).map_err(|e| {
            CourierError::Validation(format!("scheduled_at `{scheduled_at}` is not RFC 3339: {e}"))
        })?;
        let row = ScheduledMessage {
            id: uuid::Uuid::new_v4().to_string(),
            phone: phone.to_string(),
            message: message.to_string(),
            scheduled_at: due.with_timezone(&Utc),
            status: ScheduledStatus::Pending,
            created_at: now,
        };
        self.lock().push(row.clone());
        Ok(row)
    }

    pub fn remove(&self, id: &str) -> Result<(), CourierError> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|s| s.id != id);
        if entries.len() == before {
            return Err(CourierError::not_found("scheduled message", id));
        }
        Ok(())
    }

    /// Moves every pending row due at or before `now` to `Queued` and returns them.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledMessage> {
        let mut entries = self.lock();
        entries
            .iter_mut()
            .filter(|s| s.status == ScheduledStatus::Pending && s.scheduled_at <= now)
            .map(|s| {
                s.status = ScheduledStatus::Queued;
                s.clone()
            })
            .collect()
    }

    /// Sets the status of a row if it still exists.
    pub fn set_status(&self, id: &str, status: ScheduledStatus) {
        if let Some(row) = self.lock().iter_mut().find(|s| s.id == id) {
            row.status = status;
        }
    }

    pub fn get(&self, id: &str) -> Option<ScheduledMessage> {
        self.lock().iter().find(|s| s.id == id).cloned()
    }
}
