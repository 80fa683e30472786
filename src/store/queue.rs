//! `tx_queue`: signatures observed on the log feed, claimed by resolvers.

use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone)]
pub struct QueuedSig {
    pub signature: String,
    pub program_id: Option<String>,
    pub slot: Option<i64>,
}

/// Idempotent insert; a signature seen twice is ignored.
pub fn enqueue(
    conn: &Connection,
    signature: &str,
    program_id: Option<&str>,
    slot: Option<i64>,
    now: i64,
) -> Result<bool, rusqlite::Error> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tx_queue (signature, program_id, slot, status, enqueued_at)
         VALUES (?1, ?2, ?3, 'queued', ?4)",
        params![signature, program_id, slot, now],
    )?;
    Ok(inserted > 0)
}

/// Claim the oldest queued signature, transitioning it to `resolving`.
///
/// The claim is one statement, so SQLite's writer serialization guarantees
/// two resolvers never claim the same row.
pub fn claim_next(conn: &Connection) -> Result<Option<QueuedSig>, rusqlite::Error> {
    conn.query_row(
        "UPDATE tx_queue SET status = 'resolving'
         WHERE signature = (
             SELECT signature FROM tx_queue
             WHERE status = 'queued'
             ORDER BY enqueued_at ASC
             LIMIT 1
         )
         RETURNING signature, program_id, slot",
        [],
        |row| {
            Ok(QueuedSig {
                signature: row.get(0)?,
                program_id: row.get(1)?,
                slot: row.get(2)?,
            })
        },
    )
    .optional()
}

pub fn mark_resolved(conn: &Connection, signature: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE tx_queue SET status = 'resolved' WHERE signature = ?1",
        params![signature],
    )?;
    Ok(())
}

/// Record a resolution failure: bump retries, keep the row queued until the
/// retry budget is spent, then park it as `error`. The error text is
/// truncated to 255 chars.
pub fn mark_failed(
    conn: &Connection,
    signature: &str,
    error: &str,
    max_retries: i64,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "UPDATE tx_queue
         SET status = CASE WHEN retries >= ?2 THEN 'error' ELSE 'queued' END,
             retries = retries + 1,
             last_error = substr(?3, 1, 255)
         WHERE signature = ?1",
        params![signature, max_retries, error],
    )?;
    Ok(())
}
