//! `cursor_state`: named JSON cursors. Parsers persist `{"last_slot": n}`.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct SlotCursor {
    pub last_slot: i64,
}

/// Load a parser's slot cursor; a missing or unreadable row starts from 0.
pub fn load_slot_cursor(conn: &Connection, name: &str) -> Result<SlotCursor, rusqlite::Error> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM cursor_state WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?;

    Ok(value
        .and_then(|v| serde_json::from_str(&v).ok())
        .unwrap_or_default())
}

/// Persist a cursor. Called inside the same transaction as the batch writes
/// so an advance is never visible without its events.
pub fn store_slot_cursor(
    conn: &Connection,
    name: &str,
    cursor: SlotCursor,
) -> Result<(), rusqlite::Error> {
    let value = serde_json::json!({ "last_slot": cursor.last_slot }).to_string();
    conn.execute(
        "INSERT INTO cursor_state (name, value) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        params![name, value],
    )?;
    Ok(())
}
