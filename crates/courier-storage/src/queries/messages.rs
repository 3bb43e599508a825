// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message-log operations. The log is append-only: there is no update or delete.

use courier_core::{CourierError, Direction, MessageLog, MessageQuery, MessageScope, NewMessage};
use rusqlite::params;

use crate::database::{map_tr_err, parse_ts, Database};

const MESSAGE_COLUMNS: &str =
    "id, user_id, account_id, direction, message_type, content, wa_message_id, created_at";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageLog> {
    let direction: String = row.get(3)?;
    let class: String = row.get(4)?;
    Ok(MessageLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        direction: direction.parse::<Direction>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?,
        class: class.into(),
        content: row.get(5)?,
        wa_message_id: row.get(6)?,
        created_at: parse_ts(7, row.get(7)?)?,
    })
}

/// Append an entry and return it as stored.
pub async fn insert_message(
    db: &Database,
    id: String,
    msg: &NewMessage,
    now: String,
) -> Result<MessageLog, CourierError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO messages (id, user_id, account_id, direction, message_type, content, wa_message_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    msg.user_id,
                    msg.account_id,
                    msg.direction.to_string(),
                    msg.class.as_str(),
                    msg.content,
                    msg.wa_message_id,
                    now,
                ],
            )?;
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
            conn.query_row(&sql, params![id], row_to_message)
        })
        .await
        .map_err(map_tr_err)
}

/// Page through the log. A user's conversation reads oldest first; the
/// global and per-account views read newest first.
pub async fn list_messages(
    db: &Database,
    query: &MessageQuery,
) -> Result<Vec<MessageLog>, CourierError> {
    let (filter, arg, order) = match &query.scope {
        MessageScope::All => ("1 = 1", None, "DESC"),
        MessageScope::User(id) => ("user_id = ?3", Some(id.clone()), "ASC"),
        MessageScope::Account(id) => ("account_id = ?3", Some(id.clone()), "DESC"),
    };
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {filter}
         ORDER BY created_at {order}, rowid {order} LIMIT ?1 OFFSET ?2"
    );
    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);

    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = match &arg {
                Some(arg) => stmt.query_map(params![limit, offset, arg], row_to_message)?,
                None => stmt.query_map(params![limit, offset], row_to_message)?,
            };
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}
