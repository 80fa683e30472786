//! SQLite access: connection factory and idempotent schema migrations.
//!
//! Every worker opens its own connection; WAL mode plus a busy timeout let
//! the single-writer store absorb the whole pipeline. The schema lives in
//! `sql/` as numbered files with `IF NOT EXISTS` clauses and is embedded at
//! compile time so migration never depends on the working directory.

use rusqlite::Connection;
use std::time::Duration;

const BUSY_TIMEOUT_MS: u64 = 5_000;

const SCHEMA_FILES: &[(&str, &str)] = &[
    ("00_tx_queue.sql", include_str!("../sql/00_tx_queue.sql")),
    ("01_tx_raw.sql", include_str!("../sql/01_tx_raw.sql")),
    ("02_parsed_sig.sql", include_str!("../sql/02_parsed_sig.sql")),
    ("03_market_events.sql", include_str!("../sql/03_market_events.sql")),
    ("04_features_latest.sql", include_str!("../sql/04_features_latest.sql")),
    ("05_detector.sql", include_str!("../sql/05_detector.sql")),
    ("06_trading.sql", include_str!("../sql/06_trading.sql")),
    ("07_cursor_state.sql", include_str!("../sql/07_cursor_state.sql")),
];

/// Open a connection with the pipeline pragmas applied.
pub fn open(db_path: &str) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(db_path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
    Ok(conn)
}

/// Run all schema migrations. Safe to run on every startup.
pub fn run_schema_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    log::info!("🔧 Running schema migrations ({} files)", SCHEMA_FILES.len());
    for (name, sql) in SCHEMA_FILES {
        log::debug!("   ├─ executing {}", name);
        conn.execute_batch(sql)?;
    }
    log::debug!("   └─ ✅ schema up to date");
    Ok(())
}

/// Open + migrate in one step; what the workers and tests use.
pub fn open_and_migrate(db_path: &str) -> Result<Connection, rusqlite::Error> {
    let conn = open(db_path)?;
    run_schema_migrations(&conn)?;
    Ok(conn)
}

/// Current UTC unix timestamp, the clock used for every `ts` column.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// List user tables, used by the `diag` subcommand.
pub fn list_tables(conn: &Connection) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let rows = stmt.query_map([], |row| row.get(0))?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_migrations_are_idempotent() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_str().unwrap();

        let conn = open(path).unwrap();
        run_schema_migrations(&conn).unwrap();
        // Second run must be a no-op, not an error
        run_schema_migrations(&conn).unwrap();

        let tables = list_tables(&conn).unwrap();
        for expected in [
            "tx_queue",
            "tx_raw",
            "parsed_sig",
            "swap_event",
            "lp_event",
            "authority_event",
            "features_latest",
            "detector_signal",
            "detector_cursor",
            "position",
            "fill",
            "exit_event",
            "cursor_state",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[test]
    fn test_in_place_reopen() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_str().unwrap();

        open_and_migrate(path).unwrap();
        // A second connection sees the same schema
        let conn = open(path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tx_queue", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
