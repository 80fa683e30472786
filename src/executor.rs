//! Executor: turns fresh detector signals into positions, one position per
//! signal, with an entry fill.
//!
//! The venue seam is the `SignalExecutor` trait. The paper executor records
//! risk-free stubs; the live variant here is still a stub that records
//! intent. A real live implementation must fetch the market price, size the
//! order, submit the trade, wait for confirmation, and only then return an
//! `EntryPlan` carrying the actual price, size, and chain reference — a
//! position must never exist before its entry is confirmed on-chain.

use crate::config::AppConfig;
use crate::store::positions::NewPosition;
use crate::store::signals::SignalRow;
use crate::{db, store, supervisor, BoxError};
use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Paper,
    Live,
    None,
}

impl ExecMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paper" => Some(ExecMode::Paper),
            "live" => Some(ExecMode::Live),
            "none" => Some(ExecMode::None),
            _ => None,
        }
    }
}

/// Everything needed to record a position and its entry fill.
#[derive(Debug, Clone)]
pub struct EntryPlan {
    pub token: String,
    pub size: f64,
    pub entry_px: f64,
    pub slippage_bps: i64,
    pub tx: Option<String>,
}

#[async_trait]
pub trait SignalExecutor: Send + Sync {
    /// Tag recorded into position meta (`paper`, `live_stub`, ...).
    fn mode(&self) -> &'static str;

    /// Produce the entry for one signal. Implementations that talk to a
    /// venue do their full submit-and-confirm cycle here and fail the plan
    /// when the trade does not confirm.
    async fn plan_entry(&self, signal: &SignalRow) -> Result<EntryPlan, BoxError>;
}

/// Paper trading: zero size, stub price, no venue interaction.
pub struct PaperExecutor;

#[async_trait]
impl SignalExecutor for PaperExecutor {
    fn mode(&self) -> &'static str {
        "paper"
    }

    async fn plan_entry(&self, _signal: &SignalRow) -> Result<EntryPlan, BoxError> {
        Ok(EntryPlan {
            token: "SOL".to_string(),
            size: 0.0,
            entry_px: 1.0,
            slippage_bps: 0,
            tx: None,
        })
    }
}

/// Live skeleton: records intent with placeholder sizing until a venue
/// integration replaces it.
pub struct LiveStubExecutor;

#[async_trait]
impl SignalExecutor for LiveStubExecutor {
    fn mode(&self) -> &'static str {
        "live_stub"
    }

    async fn plan_entry(&self, _signal: &SignalRow) -> Result<EntryPlan, BoxError> {
        Ok(EntryPlan {
            token: "SOL".to_string(),
            size: 0.01,
            entry_px: 1.0,
            slippage_bps: 50,
            tx: None,
        })
    }
}

/// One executor tick: open positions for recent signals that have none yet.
pub async fn poll_once(
    conn: &mut Connection,
    executor: &dyn SignalExecutor,
    window_min: i64,
    batch: i64,
    now: i64,
) -> Result<usize, BoxError> {
    let signals = store::signals::recent(conn, now, window_min, batch)?;
    let mut opened = 0;

    for signal in signals {
        let signal_id = signal.id.to_string();
        if store::positions::exists_for_signal(conn, &signal_id)? {
            continue;
        }

        let plan = match executor.plan_entry(&signal).await {
            Ok(plan) => plan,
            Err(e) => {
                log::warn!("executor: entry failed for signal {}: {}", signal_id, e);
                continue;
            }
        };

        let position_id = Uuid::new_v4().to_string();
        let meta = json!({
            "signal_id": signal_id,
            "source": "detector_signal",
            "mode": executor.mode(),
        });
        store::positions::open_with_entry_fill(
            conn,
            &NewPosition {
                id: position_id.clone(),
                opened_at: now,
                pool: signal.pool.clone(),
                token: plan.token,
                size: plan.size,
                entry_px: plan.entry_px,
                slippage_bps: plan.slippage_bps,
                signal_type: signal.signal_type.clone(),
                reason: signal.reason.clone(),
                meta: meta.to_string(),
                entry_tx: plan.tx,
            },
        )?;
        opened += 1;
        log::info!(
            "executor: opened {} position {} on pool {} (signal {})",
            executor.mode(),
            position_id,
            signal.pool,
            signal_id
        );
    }

    Ok(opened)
}

pub async fn run(
    cfg: Arc<AppConfig>,
    executor: Arc<dyn SignalExecutor>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BoxError> {
    let mut conn = db::open(&cfg.db_path)?;
    let exec_cfg = cfg.executor.clone();
    log::info!(
        "executor[{}]: starting (poll {:.1}s, window {}m, batch {})",
        executor.mode(),
        exec_cfg.poll_sec,
        exec_cfg.window_min,
        exec_cfg.batch
    );

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        match poll_once(
            &mut conn,
            executor.as_ref(),
            exec_cfg.window_min,
            exec_cfg.batch,
            db::now_ts(),
        )
        .await
        {
            Ok(opened) if opened > 0 => {
                log::info!("executor[{}]: opened {} positions this tick", executor.mode(), opened)
            }
            Ok(_) => {}
            Err(e) => log::error!("executor[{}]: tick error: {}", executor.mode(), e),
        }

        if supervisor::idle(&mut shutdown, exec_cfg.poll_sec).await {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_conn() -> (NamedTempFile, Connection) {
        let temp = NamedTempFile::new().unwrap();
        let conn = crate::db::open_and_migrate(temp.path().to_str().unwrap()).unwrap();
        (temp, conn)
    }

    fn seed_signal(conn: &Connection, pool: &str, created_at: i64) -> i64 {
        conn.execute(
            "INSERT INTO detector_signal (pool, signal_type, reason, feature_snapshot, created_at)
             VALUES (?1, 'long', 'SCF5:test', '{}', ?2)",
            rusqlite::params![pool, created_at],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    #[tokio::test]
    async fn test_paper_entry_is_risk_free() {
        let (_temp, mut conn) = test_conn();
        let now = 1_700_000_000;
        let signal_id = seed_signal(&conn, "AAA", now - 30);

        let opened = poll_once(&mut conn, &PaperExecutor, 10, 200, now).await.unwrap();
        assert_eq!(opened, 1);

        let (state, size, entry_px, mode, meta_signal): (String, f64, f64, String, String) = conn
            .query_row(
                "SELECT state, size, entry_px,
                        json_extract(meta, '$.mode'), json_extract(meta, '$.signal_id')
                 FROM position",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
            )
            .unwrap();
        assert_eq!(state, "OPEN");
        assert_eq!(size, 0.0);
        assert_eq!(entry_px, 1.0);
        assert_eq!(mode, "paper");
        assert_eq!(meta_signal, signal_id.to_string());

        let (side, px, qty): (String, f64, f64) = conn
            .query_row("SELECT side, px, qty FROM fill", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap();
        assert_eq!(side, "entry");
        assert_eq!(px, 1.0);
        assert_eq!(qty, 0.0);
    }

    #[tokio::test]
    async fn test_one_position_per_signal() {
        let (_temp, mut conn) = test_conn();
        let now = 1_700_000_000;
        seed_signal(&conn, "AAA", now - 30);

        assert_eq!(poll_once(&mut conn, &PaperExecutor, 10, 200, now).await.unwrap(), 1);
        // Re-polling the same window opens nothing new
        assert_eq!(poll_once(&mut conn, &PaperExecutor, 10, 200, now).await.unwrap(), 0);
        assert_eq!(
            poll_once(&mut conn, &PaperExecutor, 10, 200, now + 5).await.unwrap(),
            0
        );

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM position", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_window_excludes_stale_signals() {
        let (_temp, mut conn) = test_conn();
        let now = 1_700_000_000;
        seed_signal(&conn, "OLD", now - 3600);
        seed_signal(&conn, "NEW", now - 60);

        assert_eq!(poll_once(&mut conn, &PaperExecutor, 10, 200, now).await.unwrap(), 1);
        let pool: String = conn
            .query_row("SELECT pool FROM position", [], |r| r.get(0))
            .unwrap();
        assert_eq!(pool, "NEW");
    }

    #[tokio::test]
    async fn test_live_stub_sizing() {
        let (_temp, mut conn) = test_conn();
        let now = 1_700_000_000;
        seed_signal(&conn, "AAA", now - 30);

        poll_once(&mut conn, &LiveStubExecutor, 10, 200, now).await.unwrap();

        let (size, slippage, mode, tx): (f64, i64, String, Option<String>) = conn
            .query_row(
                "SELECT p.size, p.slippage_bps, json_extract(p.meta, '$.mode'), f.tx
                 FROM position p JOIN fill f ON f.pos_id = p.id",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(size, 0.01);
        assert_eq!(slippage, 50);
        assert_eq!(mode, "live_stub");
        assert!(tx.is_none());
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(ExecMode::parse("paper"), Some(ExecMode::Paper));
        assert_eq!(ExecMode::parse("live"), Some(ExecMode::Live));
        assert_eq!(ExecMode::parse("none"), Some(ExecMode::None));
        assert_eq!(ExecMode::parse("bogus"), None);
    }
}
