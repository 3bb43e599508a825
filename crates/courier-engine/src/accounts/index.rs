// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk index of known accounts (`accounts.json` in the session directory).
//!
//! The messenger session stores hold the credentials; the index only
//! remembers which stores exist and what the operator named them.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use courier_core::CourierError;

pub const INDEX_FILE: &str = "accounts.json";

/// Id of the legacy single-account session.
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// One persisted account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Session store file for an account id.
pub fn session_file_name(id: &str) -> String {
    if id == DEFAULT_ACCOUNT_ID {
        "wa_session.db".to_string()
    } else {
        format!("wa_session_{id}.db")
    }
}

/// Reads and writes the account index.
#[derive(Debug, Clone)]
pub struct AccountIndex {
    path: PathBuf,
}

impl AccountIndex {
    pub fn new(session_dir: &Path) -> Self {
        Self {
            path: session_dir.join(INDEX_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the index. A missing file is an empty index.
    pub async fn load(&self) -> Result<Vec<IndexEntry>, CourierError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                CourierError::Config(format!("corrupt account index {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(CourierError::storage(e)),
        }
    }

    /// Replaces the index atomically (write to a temp file, then rename).
    pub async fn save(&self, entries: &[IndexEntry]) -> Result<(), CourierError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(CourierError::storage)?;
        }
        let body = serde_json::to_vec_pretty(entries)
            .map_err(|e| CourierError::Internal(format!("failed to encode account index: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(CourierError::storage)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(CourierError::storage)?;
        Ok(())
    }
}
