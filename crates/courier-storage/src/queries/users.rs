// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User CRUD operations.

use courier_core::{CourierError, FieldUpdate, NewUser, User, UserUpdate};
use rusqlite::params;
use rusqlite::types::Value;

use crate::database::{format_ts, map_tr_err, parse_ts, Database};

const USER_COLUMNS: &str = "id, phone, name, notes, account_id, opt_in, blocked, \
     last_user_message_at, last_system_sent_at, created_at, updated_at";

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        phone: row.get(1)?,
        name: row.get(2)?,
        notes: row.get(3)?,
        account_id: row.get(4)?,
        opt_in: row.get(5)?,
        blocked: row.get(6)?,
        last_user_message_at: parse_ts(7, row.get(7)?)?,
        last_system_sent_at: parse_ts(8, row.get(8)?)?,
        created_at: parse_ts(9, row.get(9)?)?,
        updated_at: parse_ts(10, row.get(10)?)?,
    })
}

async fn find_one(db: &Database, filter: &'static str, args: Vec<String>) -> Result<Option<User>, CourierError> {
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users WHERE {filter} ORDER BY created_at ASC, rowid ASC LIMIT 1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let result = stmt.query_row(rusqlite::params_from_iter(args.iter()), row_to_user);
            match result {
                Ok(user) => Ok(Some(user)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Oldest user with this phone on any account.
pub async fn find_by_phone(db: &Database, phone: &str) -> Result<Option<User>, CourierError> {
    find_one(db, "phone = ?1", vec![phone.to_string()]).await
}

pub async fn find_by_phone_and_account(
    db: &Database,
    phone: &str,
    account_id: &str,
) -> Result<Option<User>, CourierError> {
    find_one(
        db,
        "phone = ?1 AND account_id = ?2",
        vec![phone.to_string(), account_id.to_string()],
    )
    .await
}

pub async fn find_by_id(db: &Database, id: &str) -> Result<Option<User>, CourierError> {
    find_one(db, "id = ?1", vec![id.to_string()]).await
}

/// Insert a user with defaults (opted in, not blocked) and return the stored row.
pub async fn insert_user(
    db: &Database,
    id: String,
    user: &NewUser,
    now: String,
) -> Result<User, CourierError> {
    let user = user.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (id, phone, name, account_id, opt_in, blocked, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 1, 0, ?5, ?5)",
                params![id, user.phone, user.name, user.account_id, now],
            )?;
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            conn.query_row(&sql, params![id], row_to_user)
        })
        .await
        .map_err(map_tr_err)
}

fn ts_value(update: &FieldUpdate<chrono::DateTime<chrono::Utc>>, now: &str) -> Value {
    match update {
        FieldUpdate::Set(ts) => Value::Text(format_ts(*ts)),
        FieldUpdate::ServerTimestamp => Value::Text(now.to_string()),
    }
}

/// Apply a partial update; `updated_at` is stamped whenever anything changes.
///
/// Returns the number of rows touched (0 for an unknown id).
pub async fn update_user(
    db: &Database,
    id: &str,
    update: &UserUpdate,
    now: String,
) -> Result<usize, CourierError> {
    if update.is_empty() {
        return Ok(0);
    }

    let mut sets: Vec<(&'static str, Value)> = Vec::new();
    if let Some(name) = &update.name {
        sets.push(("name", Value::Text(name.clone())));
    }
    if let Some(notes) = &update.notes {
        sets.push(("notes", Value::Text(notes.clone())));
    }
    if let Some(opt_in) = update.opt_in {
        sets.push(("opt_in", Value::Integer(i64::from(opt_in))));
    }
    if let Some(blocked) = update.blocked {
        sets.push(("blocked", Value::Integer(i64::from(blocked))));
    }
    if let Some(ts) = &update.last_user_message_at {
        sets.push(("last_user_message_at", ts_value(ts, &now)));
    }
    if let Some(ts) = &update.last_system_sent_at {
        sets.push(("last_system_sent_at", ts_value(ts, &now)));
    }
    sets.push(("updated_at", Value::Text(now)));

    let assignments = sets
        .iter()
        .enumerate()
        .map(|(i, (col, _))| format!("{col} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE users SET {assignments} WHERE id = ?{}", sets.len() + 1);
    let mut values: Vec<Value> = sets.into_iter().map(|(_, v)| v).collect();
    values.push(Value::Text(id.to_string()));

    db.connection()
        .call(move |conn| conn.execute(&sql, rusqlite::params_from_iter(values)))
        .await
        .map_err(map_tr_err)
}

/// All users, newest first.
pub async fn list_users(db: &Database) -> Result<Vec<User>, CourierError> {
    db.connection()
        .call(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, rowid DESC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_user)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}
