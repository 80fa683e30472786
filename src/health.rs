//! Health monitor: one line of row counts and event freshness, the primary
//! operational signal for the whole pipeline.

use crate::config::AppConfig;
use crate::{db, supervisor};
use rusqlite::{Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::watch;

const TICK_SECS: f64 = 5.0;

const COUNTED_TABLES: &[&str] = &[
    "tx_queue",
    "tx_raw",
    "authority_event",
    "features_latest",
    "detector_signal",
    "position",
];

/// Build the one-line snapshot. A connection failure is itself the snapshot.
pub fn snapshot(db_path: &str) -> String {
    let conn = match db::open(db_path) {
        Ok(conn) => conn,
        Err(e) => return format!("db=DOWN: {}", e),
    };
    match build_snapshot(&conn) {
        Ok(line) => line,
        Err(e) => format!("db=ERR: {}", e),
    }
}

fn build_snapshot(conn: &Connection) -> Result<String, rusqlite::Error> {
    let now = db::now_ts();
    let mut parts = vec!["db=OK".to_string()];

    for table in &COUNTED_TABLES[..2] {
        parts.push(format!("{}={}", table, count(conn, table)?));
    }
    // Event tables also report freshness of their newest row
    for table in ["swap_event", "lp_event"] {
        let max_ts: Option<i64> = conn
            .query_row(&format!("SELECT MAX(ts) FROM {}", table), [], |r| r.get(0))
            .optional()?
            .flatten();
        parts.push(format!(
            "{}={} (max {})",
            table,
            count(conn, table)?,
            ago(now, max_ts)
        ));
    }
    for table in &COUNTED_TABLES[2..] {
        parts.push(format!("{}={}", table, count(conn, table)?));
    }

    Ok(parts.join(" | "))
}

fn count(conn: &Connection, table: &str) -> Result<i64, rusqlite::Error> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
}

fn ago(now: i64, ts: Option<i64>) -> String {
    match ts {
        Some(ts) => format!("{}s ago", (now - ts).max(0)),
        None => "n/a".to_string(),
    }
}

/// Periodic ticker; runs on the orchestrator's main task until shutdown.
pub async fn run_ticker(cfg: Arc<AppConfig>, mut shutdown: watch::Receiver<bool>) {
    loop {
        log::info!("[HEALTH] {}", snapshot(&cfg.db_path));
        if supervisor::idle(&mut shutdown, TICK_SECS).await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_snapshot_counts_and_freshness() {
        let temp = NamedTempFile::new().unwrap();
        let path = temp.path().to_str().unwrap();
        let conn = db::open_and_migrate(path).unwrap();

        conn.execute(
            "INSERT INTO tx_queue (signature, status, enqueued_at) VALUES ('s1', 'queued', 1)",
            [],
        )
        .unwrap();
        let recent = db::now_ts() - 3;
        conn.execute(
            "INSERT INTO swap_event (ts, sig, slot, pool, token, side, price, base_amt, quote_amt)
             VALUES (?1, 's1', 1, 'p', 't', 1, 1.0, 1.0, 1.0)",
            [recent],
        )
        .unwrap();

        let line = snapshot(path);
        assert!(line.starts_with("db=OK"), "got: {}", line);
        assert!(line.contains("tx_queue=1"));
        assert!(line.contains("swap_event=1"));
        assert!(line.contains("lp_event=0 (max n/a)"));
        // swap freshness is a few seconds, not n/a
        assert!(!line.contains("swap_event=1 (max n/a)"));
    }

    #[test]
    fn test_snapshot_reports_down_db() {
        let line = snapshot("/nonexistent/dir/poolflow.db");
        assert!(line.starts_with("db=DOWN:"), "got: {}", line);
    }
}
