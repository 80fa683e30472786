//! `detector_signal` and the detector heartbeat.

use rusqlite::{params, Connection};

#[derive(Debug, Clone)]
pub struct SignalRow {
    pub id: i64,
    pub pool: String,
    pub signal_type: String,
    pub reason: Option<String>,
}

/// Guarded append: nothing is written if the same (pool, signal_type) was
/// emitted within the dedup window. One statement, so the check and the
/// insert cannot interleave with another emitter.
pub fn insert_deduped(
    conn: &Connection,
    pool: &str,
    signal_type: &str,
    reason: &str,
    feature_snapshot: &str,
    now: i64,
    dedup_sec: i64,
) -> Result<bool, rusqlite::Error> {
    let inserted = conn.execute(
        "INSERT INTO detector_signal (pool, signal_type, reason, feature_snapshot, created_at)
         SELECT ?1, ?2, ?3, ?4, ?5
         WHERE NOT EXISTS (
             SELECT 1 FROM detector_signal
             WHERE pool = ?1 AND signal_type = ?2 AND created_at >= ?6
         )",
        params![pool, signal_type, reason, feature_snapshot, now, now - dedup_sec],
    )?;
    Ok(inserted > 0)
}

/// Signals created in the last `window_min` minutes, oldest first.
pub fn recent(
    conn: &Connection,
    now: i64,
    window_min: i64,
    batch: i64,
) -> Result<Vec<SignalRow>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, pool, signal_type, reason FROM detector_signal
         WHERE created_at > ?1
         ORDER BY created_at ASC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![now - window_min * 60, batch], |row| {
        Ok(SignalRow {
            id: row.get(0)?,
            pool: row.get(1)?,
            signal_type: row.get(2)?,
            reason: row.get(3)?,
        })
    })?;
    rows.collect()
}

pub fn touch_cursor(conn: &Connection, now: i64) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO detector_cursor (id, last_seen) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET last_seen = excluded.last_seen",
        params![now],
    )?;
    Ok(())
}
