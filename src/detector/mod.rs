//! Detector: applies the five-condition rule to the latest feature
//! snapshots and emits deduplicated `long` signals.
//!
//! The five proxies: volatility compression (VC), order-flow stillness
//! (OFS), liquidity thinness (LT), wallet convergence (WC), retail quiet
//! (RQ). All five must hold simultaneously. Non-satisfaction is not an
//! error; it only shows up in aggregate counts.

pub mod view;

use crate::config::{AppConfig, DetectorConfig};
use crate::{db, store, supervisor, BoxError};
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;
use view::FeatureView;

pub const SIGNAL_TYPE: &str = "long";
const SCAN_LIMIT: usize = 1000;

/// Rule verdict with its reason string: `SCF5:<thresholds>` on pass,
/// `missing:<keys>` / `type_cast_fail` / `fail:<names>` otherwise.
///
/// This is the dry-run API: it inspects a snapshot row without writing.
pub fn evaluate(
    row: &Map<String, Value>,
    view: &FeatureView,
    thresholds: &DetectorConfig,
) -> (bool, String) {
    let mut inputs = [0.0f64; 5];
    let mut missing: Vec<&str> = Vec::new();
    let mut cast_failed = false;

    for (idx, (logical, _)) in view::FEATURE_KEYS.iter().copied().enumerate() {
        match view.pick(logical, row) {
            Ok(Some(value)) => inputs[idx] = value,
            Ok(None) => missing.push(logical),
            Err(_) => cast_failed = true,
        }
    }
    // Missing inputs take precedence over cast failures in the reason
    if !missing.is_empty() {
        return (false, format!("missing:{}", missing.join(",")));
    }
    if cast_failed {
        return (false, "type_cast_fail".to_string());
    }

    let [vc, ofs, lt, wc, rq] = inputs;
    let conditions = [
        ("VC", vc <= thresholds.vc_max),
        ("OFS", ofs.abs() <= thresholds.ofs_max),
        ("LT", lt <= thresholds.lt_max),
        ("WC", wc >= thresholds.wc_min),
        ("RQ", rq <= thresholds.rq_max),
    ];
    let failed: Vec<&str> = conditions
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect();
    if !failed.is_empty() {
        return (false, format!("fail:{}", failed.join(",")));
    }

    (
        true,
        format!(
            "SCF5:vc<={},|ofs|<={},lt<={},wc>={},rq<={}",
            thresholds.vc_max,
            thresholds.ofs_max,
            thresholds.lt_max,
            thresholds.wc_min,
            thresholds.rq_max
        ),
    )
}

/// One detector tick: scan snapshots, emit guarded signals, touch the
/// heartbeat. Returns how many signals were written.
pub fn poll_once(
    conn: &Connection,
    view: &FeatureView,
    thresholds: &DetectorConfig,
    now: i64,
) -> Result<usize, BoxError> {
    let rows = store::features::latest_rows(conn, SCAN_LIMIT)?;
    let mut made = 0;

    for row in rows {
        let pool = row
            .get("pool")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if pool.is_empty() {
            continue;
        }

        let (passed, reason) = evaluate(&row, view, thresholds);
        if !passed {
            continue;
        }

        let snapshot = Value::Object(row.clone()).to_string();
        if store::signals::insert_deduped(
            conn,
            pool,
            SIGNAL_TYPE,
            &reason,
            &snapshot,
            now,
            thresholds.dedup_sec,
        )? {
            made += 1;
        }
    }

    store::signals::touch_cursor(conn, now)?;
    Ok(made)
}

pub async fn run(cfg: Arc<AppConfig>, mut shutdown: watch::Receiver<bool>) -> Result<(), BoxError> {
    let conn = db::open(&cfg.db_path)?;
    let view = FeatureView::resolve(&conn)?;
    let thresholds = cfg.detector.clone();
    log::info!(
        "detector: online (poll {:.1}s, dedup {}s)",
        thresholds.poll_sec,
        thresholds.dedup_sec
    );

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        match poll_once(&conn, &view, &thresholds, db::now_ts()) {
            Ok(made) if made > 0 => log::info!("detector: emitted {} signals", made),
            Ok(_) => {}
            Err(e) => log::error!("detector: tick error: {}", e),
        }

        if supervisor::idle(&mut shutdown, thresholds.poll_sec).await {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn thresholds() -> DetectorConfig {
        DetectorConfig {
            vc_max: 0.015,
            ofs_max: 0.001,
            lt_max: 5000.0,
            wc_min: 0.6,
            rq_max: 0.5,
            poll_sec: 2.0,
            dedup_sec: 300,
        }
    }

    fn test_setup() -> (NamedTempFile, Connection, FeatureView) {
        let temp = NamedTempFile::new().unwrap();
        let conn = crate::db::open_and_migrate(temp.path().to_str().unwrap()).unwrap();
        let view = FeatureView::resolve(&conn).unwrap();
        (temp, conn, view)
    }

    fn seed_pool(conn: &Connection, pool: &str, wc: f64) {
        conn.execute(
            "INSERT INTO features_latest
                 (pool, ts, atr15, cvd_slope_1m, depth_1p0, wc_quality_arrivals, watchers_slope)
             VALUES (?1, ?2, 0.010, 0.0005, 1000.0, ?3, 0.2)",
            rusqlite::params![pool, 1_700_000_000i64, wc],
        )
        .unwrap();
    }

    #[test]
    fn test_rule_pass_reason() {
        let (_t, conn, view) = test_setup();
        seed_pool(&conn, "AAA", 0.7);
        let row = store::features::latest_rows(&conn, 10).unwrap().remove(0);

        let (ok, reason) = evaluate(&row, &view, &thresholds());
        assert!(ok);
        assert!(reason.starts_with("SCF5:"));
        assert!(reason.contains("vc<=0.015"));
    }

    #[test]
    fn test_rule_failure_names_conditions() {
        let (_t, conn, view) = test_setup();
        // WC below the minimum, everything else in range
        seed_pool(&conn, "AAA", 0.5);
        let row = store::features::latest_rows(&conn, 10).unwrap().remove(0);

        let (ok, reason) = evaluate(&row, &view, &thresholds());
        assert!(!ok);
        assert_eq!(reason, "fail:WC");
    }

    #[test]
    fn test_rule_missing_inputs() {
        let (_t, conn, view) = test_setup();
        conn.execute(
            "INSERT INTO features_latest (pool, ts, atr15) VALUES ('AAA', 1, 0.01)",
            [],
        )
        .unwrap();
        let row = store::features::latest_rows(&conn, 10).unwrap().remove(0);

        let (ok, reason) = evaluate(&row, &view, &thresholds());
        assert!(!ok);
        assert_eq!(reason, "missing:ofs,lt,wc,rq");
    }

    #[test]
    fn test_rule_cast_failure() {
        let (_t, conn, view) = test_setup();
        seed_pool(&conn, "AAA", 0.7);
        // SQLite's dynamic typing lets junk land in a REAL column
        conn.execute(
            "UPDATE features_latest SET depth_1p0 = 'garbage' WHERE pool = 'AAA'",
            [],
        )
        .unwrap();
        let row = store::features::latest_rows(&conn, 10).unwrap().remove(0);

        let (ok, reason) = evaluate(&row, &view, &thresholds());
        assert!(!ok);
        assert_eq!(reason, "type_cast_fail");
    }

    #[test]
    fn test_poll_emits_once_within_dedup_window() {
        let (_t, conn, view) = test_setup();
        seed_pool(&conn, "AAA", 0.7);
        let now = 1_700_000_000;
        let th = thresholds();

        assert_eq!(poll_once(&conn, &view, &th, now).unwrap(), 1);
        // Two more ticks inside the window change nothing
        assert_eq!(poll_once(&conn, &view, &th, now + 2).unwrap(), 0);
        assert_eq!(poll_once(&conn, &view, &th, now + 4).unwrap(), 0);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM detector_signal", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);

        // Snapshot carries the full row
        let snapshot: String = conn
            .query_row("SELECT feature_snapshot FROM detector_signal", [], |r| {
                r.get(0)
            })
            .unwrap();
        let parsed: Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(parsed["wc_quality_arrivals"], json!(0.7));

        // Heartbeat advanced
        let last_seen: i64 = conn
            .query_row("SELECT last_seen FROM detector_cursor", [], |r| r.get(0))
            .unwrap();
        assert_eq!(last_seen, now + 4);
    }

    #[test]
    fn test_poll_skips_failing_and_empty_pools() {
        let (_t, conn, view) = test_setup();
        seed_pool(&conn, "", 0.7); // empty pool identifier
        seed_pool(&conn, "BBB", 0.1); // fails WC

        assert_eq!(poll_once(&conn, &view, &thresholds(), 1_700_000_000).unwrap(), 0);
    }
}
