//! `position` + `fill`: executor-side operations.
//!
//! The exit engine owns its own transactional statements in
//! `crate::exit_engine`; this module covers opening positions and the
//! queries shared across workers.

use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone)]
pub struct NewPosition {
    pub id: String,
    pub opened_at: i64,
    pub pool: String,
    pub token: String,
    pub size: f64,
    pub entry_px: f64,
    pub slippage_bps: i64,
    pub signal_type: String,
    pub reason: Option<String>,
    /// JSON object; must carry `signal_id` for the executor dedup invariant.
    pub meta: String,
    /// Chain reference of the entry trade, NULL until a live venue fills it.
    pub entry_tx: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub id: String,
    pub pool: String,
    pub size: f64,
    pub entry_px: f64,
}

/// True when some position already references this signal id in its meta.
pub fn exists_for_signal(conn: &Connection, signal_id: &str) -> Result<bool, rusqlite::Error> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM position WHERE json_extract(meta, '$.signal_id') = ?1 LIMIT 1",
            params![signal_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Open a position and record its entry fill in one transaction.
pub fn open_with_entry_fill(
    conn: &mut Connection,
    position: &NewPosition,
) -> Result<(), rusqlite::Error> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO position (
             id, opened_at, pool, token, size, entry_px, slippage_bps,
             state, status, signal_type, reason, entry_price, meta
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'OPEN', 'open', ?8, ?9, ?10, ?11)",
        params![
            position.id,
            position.opened_at,
            position.pool,
            position.token,
            position.size,
            position.entry_px,
            position.slippage_bps,
            position.signal_type,
            position.reason,
            position.entry_px,
            position.meta,
        ],
    )?;
    tx.execute(
        "INSERT INTO fill (ts, pos_id, side, px, qty, tx)
         VALUES (?1, ?2, 'entry', ?3, ?4, ?5)",
        params![
            position.opened_at,
            position.id,
            position.entry_px,
            position.size,
            position.entry_tx,
        ],
    )?;
    tx.commit()
}

pub fn open_positions(conn: &Connection) -> Result<Vec<OpenPosition>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, pool, size, entry_px FROM position WHERE state = 'OPEN' ORDER BY opened_at ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(OpenPosition {
            id: row.get(0)?,
            pool: row.get(1)?,
            size: row.get(2)?,
            entry_px: row.get(3)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::NamedTempFile;

    fn test_conn() -> (NamedTempFile, Connection) {
        let temp = NamedTempFile::new().unwrap();
        let conn = db::open_and_migrate(temp.path().to_str().unwrap()).unwrap();
        (temp, conn)
    }

    fn paper_position(id: &str, signal_id: &str) -> NewPosition {
        NewPosition {
            id: id.to_string(),
            opened_at: 1_700_000_000,
            pool: "pool_a".to_string(),
            token: "SOL".to_string(),
            size: 0.0,
            entry_px: 1.0,
            slippage_bps: 0,
            signal_type: "long".to_string(),
            reason: Some("test".to_string()),
            meta: format!(
                r#"{{"signal_id":"{}","source":"detector_signal","mode":"paper"}}"#,
                signal_id
            ),
            entry_tx: None,
        }
    }

    #[test]
    fn test_open_records_position_and_entry_fill() {
        let (_temp, mut conn) = test_conn();
        open_with_entry_fill(&mut conn, &paper_position("pos1", "41")).unwrap();

        let (state, status, entry_price): (String, String, f64) = conn
            .query_row(
                "SELECT state, status, entry_price FROM position WHERE id = 'pos1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(state, "OPEN");
        assert_eq!(status, "open");
        assert_eq!(entry_price, 1.0);

        let (side, px, qty): (String, f64, f64) = conn
            .query_row(
                "SELECT side, px, qty FROM fill WHERE pos_id = 'pos1'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(side, "entry");
        assert_eq!(px, 1.0);
        assert_eq!(qty, 0.0);
    }

    #[test]
    fn test_signal_dedup_lookup() {
        let (_temp, mut conn) = test_conn();
        open_with_entry_fill(&mut conn, &paper_position("pos1", "41")).unwrap();

        assert!(exists_for_signal(&conn, "41").unwrap());
        assert!(!exists_for_signal(&conn, "42").unwrap());
    }

    #[test]
    fn test_open_positions_excludes_closed() {
        let (_temp, mut conn) = test_conn();
        open_with_entry_fill(&mut conn, &paper_position("pos1", "41")).unwrap();
        open_with_entry_fill(&mut conn, &paper_position("pos2", "42")).unwrap();
        conn.execute("UPDATE position SET state = 'CLOSED' WHERE id = 'pos1'", [])
            .unwrap();

        let open = open_positions(&conn).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "pos2");
    }
}
