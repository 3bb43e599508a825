// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row-store layer for the Courier messaging backend.
//!
//! Two [`Repository`](courier_core::Repository) implementations share one
//! contract: [`SqliteRepository`] keeps users and the message log in a local
//! WAL-mode SQLite file with embedded migrations, and [`PostgrestRepository`]
//! talks to a hosted Supabase project.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod postgrest;
pub mod queries;

use std::sync::Arc;
use std::time::Duration;

use courier_config::model::StoreConfig;
use courier_core::{Clock, CourierError, Repository};

pub use adapter::SqliteRepository;
pub use database::Database;
pub use postgrest::PostgrestRepository;

/// Open the repository selected by configuration.
///
/// A configured Supabase URL selects PostgREST; otherwise the local SQLite
/// database is opened (and migrated).
pub async fn open_repository(
    config: &StoreConfig,
    clock: Arc<dyn Clock>,
    rpc_timeout: Duration,
) -> Result<Arc<dyn Repository>, CourierError> {
    match (&config.supabase_url, &config.supabase_key) {
        (Some(url), Some(key)) => {
            tracing::info!(url = %url, "using PostgREST row store");
            Ok(Arc::new(PostgrestRepository::new(url, key, rpc_timeout)?))
        }
        (Some(_), None) => Err(CourierError::Config(
            "store.supabase_key is required when store.supabase_url is set".into(),
        )),
        (None, _) => {
            tracing::info!(path = %config.database_path, "using local SQLite row store");
            Ok(Arc::new(
                SqliteRepository::open(&config.database_path, clock).await?,
            ))
        }
    }
}
