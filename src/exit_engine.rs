//! Exit worker: monitors open positions against the latest observed pool
//! price and applies partial and full take-profit / stop-loss exits.
//!
//! Per position and per ladder level, at most one partial ever fires; the
//! tag recording a fired level is merged into the position meta in the SAME
//! transaction as the fill and the size decrement, so a crash cannot replay
//! a partial. This worker must run as a singleton per position: the partial
//! transition is not safe against concurrent writers.
//!
//! A tick that fires a partial does not also evaluate the full close; the
//! full close happens on a later tick once no untaken crossed level remains.

use crate::config::{AppConfig, ExitConfig, PartialLevel};
use crate::store::positions::OpenPosition;
use crate::{db, store, supervisor, BoxError};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSide {
    Tp,
    Sl,
}

impl ExitSide {
    pub fn label(self) -> &'static str {
        match self {
            ExitSide::Tp => "TP",
            ExitSide::Sl => "SL",
        }
    }

    fn partial_reason(self) -> &'static str {
        match self {
            ExitSide::Tp => "TP_PARTIAL",
            ExitSide::Sl => "SL_PARTIAL",
        }
    }
}

/// A fired ladder level, serialized into position meta as a boolean key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialTag {
    pub side: ExitSide,
    pub level: f64,
}

impl PartialTag {
    /// Meta key, e.g. `partial_TP_1.5`. Whole levels keep one decimal so
    /// 2.0 reads as `partial_TP_2.0`.
    pub fn key(&self) -> String {
        format!("partial_{}_{}", self.side.label(), fmt_level(self.level))
    }
}

fn fmt_level(level: f64) -> String {
    if level.fract() == 0.0 {
        format!("{:.1}", level)
    } else {
        level.to_string()
    }
}

#[derive(Debug)]
pub enum ExitError {
    Db(rusqlite::Error),
    /// Bookkeeping went inconsistent (e.g. negative remaining size); the
    /// worker halts and the supervisor restarts it.
    Invariant(String),
}

impl std::fmt::Display for ExitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitError::Db(e) => write!(f, "store error: {}", e),
            ExitError::Invariant(msg) => write!(f, "invariant violation: {}", msg),
        }
    }
}

impl std::error::Error for ExitError {}

impl From<rusqlite::Error> for ExitError {
    fn from(e: rusqlite::Error) -> Self {
        ExitError::Db(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No level crossed, no close condition met.
    Untouched,
    /// This many partial fills executed; full close deferred to a later tick.
    Partials(u32),
    Closed(ClosedReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    TpHit,
    SlHit,
}

impl ClosedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ClosedReason::TpHit => "TP_HIT",
            ClosedReason::SlHit => "SL_HIT",
        }
    }
}

/// Advance one position against the current price.
pub fn tick_position(
    conn: &mut Connection,
    position: &OpenPosition,
    cur_px: f64,
    cfg: &ExitConfig,
) -> Result<TickOutcome, ExitError> {
    let mut fired = 0;
    fired += apply_partials(conn, position, cur_px, &cfg.tp_partials, ExitSide::Tp)?;
    fired += apply_partials(conn, position, cur_px, &cfg.sl_partials, ExitSide::Sl)?;
    if fired > 0 {
        return Ok(TickOutcome::Partials(fired));
    }

    let tp_px = position.entry_px * cfg.tp_mult;
    let sl_px = position.entry_px * cfg.sl_mult;

    if cur_px >= tp_px {
        let meta = json!({"entry_px": position.entry_px, "exit_px": cur_px, "tp_mult": cfg.tp_mult});
        if close_full(conn, &position.id, cur_px, ClosedReason::TpHit, &meta)? {
            return Ok(TickOutcome::Closed(ClosedReason::TpHit));
        }
    } else if cur_px <= sl_px {
        let meta = json!({"entry_px": position.entry_px, "exit_px": cur_px, "sl_mult": cfg.sl_mult});
        if close_full(conn, &position.id, cur_px, ClosedReason::SlHit, &meta)? {
            return Ok(TickOutcome::Closed(ClosedReason::SlHit));
        }
    }

    Ok(TickOutcome::Untouched)
}

/// Execute every crossed, untaken level of one ladder. Each level runs as
/// one transaction over (fill insert, size decrement, meta merge, exit
/// event); the size is re-read per level so cascading rungs compound.
fn apply_partials(
    conn: &mut Connection,
    position: &OpenPosition,
    cur_px: f64,
    partials: &[PartialLevel],
    side: ExitSide,
) -> Result<u32, ExitError> {
    if partials.is_empty() {
        return Ok(0);
    }

    let multiple = cur_px / position.entry_px.max(1e-12);
    let mut fired = 0;

    for rung in partials {
        if multiple < rung.level {
            continue;
        }
        let tag = PartialTag { side, level: rung.level }.key();

        let tx = conn.transaction()?;
        let row: Option<(f64, String)> = tx
            .query_row(
                "SELECT size, meta FROM position WHERE id = ?1 AND state = 'OPEN'",
                params![position.id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((size, meta_text)) = row else {
            break; // closed underneath us; nothing further to do
        };

        let mut meta: Map<String, Value> =
            serde_json::from_str(&meta_text).unwrap_or_default();
        if meta.get(&tag).and_then(Value::as_bool).unwrap_or(false) {
            continue; // level already taken; tx drops and rolls back
        }

        let qty = size * rung.ratio;
        let remaining = size - qty;
        if size < 0.0 || remaining < 0.0 {
            return Err(ExitError::Invariant(format!(
                "position {} size {} would drop below zero (qty {})",
                position.id, size, qty
            )));
        }

        let now = db::now_ts();
        tx.execute(
            "INSERT INTO fill (ts, pos_id, side, px, qty, tx)
             VALUES (?1, ?2, 'SELL', ?3, ?4, NULL)",
            params![now, position.id, cur_px, qty],
        )?;
        meta.insert(tag.clone(), Value::Bool(true));
        tx.execute(
            "UPDATE position SET size = ?2, meta = ?3 WHERE id = ?1",
            params![position.id, remaining, Value::Object(meta).to_string()],
        )?;
        let event_meta = json!({
            "level": rung.level,
            "ratio": rung.ratio,
            "px": cur_px,
        });
        tx.execute(
            "INSERT INTO exit_event (ts, pos_id, reason, meta)
             VALUES (?1, ?2, ?3, ?4)",
            params![now, position.id, side.partial_reason(), event_meta.to_string()],
        )?;
        tx.commit()?;

        fired += 1;
        log::info!(
            "exit_worker: partial {} on {} at {:.6} (level {}, qty {:.6})",
            side.label(),
            position.id,
            cur_px,
            rung.level,
            qty
        );
    }

    Ok(fired)
}

/// Sell the full remaining size and mark the position CLOSED. Returns false
/// when the position was not OPEN anymore.
fn close_full(
    conn: &mut Connection,
    position_id: &str,
    cur_px: f64,
    reason: ClosedReason,
    meta: &Value,
) -> Result<bool, ExitError> {
    let tx = conn.transaction()?;
    let size: Option<f64> = tx
        .query_row(
            "SELECT size FROM position WHERE id = ?1 AND state = 'OPEN'",
            params![position_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(size) = size else {
        return Ok(false);
    };

    let now = db::now_ts();
    tx.execute(
        "INSERT INTO fill (ts, pos_id, side, px, qty, tx)
         VALUES (?1, ?2, 'SELL', ?3, ?4, NULL)",
        params![now, position_id, cur_px, size],
    )?;
    tx.execute(
        "UPDATE position SET state = 'CLOSED' WHERE id = ?1 AND state = 'OPEN'",
        params![position_id],
    )?;
    tx.execute(
        "INSERT INTO exit_event (ts, pos_id, reason, meta)
         VALUES (?1, ?2, ?3, ?4)",
        params![now, position_id, reason.as_str(), meta.to_string()],
    )?;
    tx.commit()?;

    log::info!(
        "exit_worker: {} on {} at {:.6} (qty {:.6})",
        reason.as_str(),
        position_id,
        cur_px,
        size
    );
    Ok(true)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PollStats {
    pub partials: u32,
    pub closed: u32,
}

/// One scan over every open position. Positions without a usable price are
/// skipped this tick.
pub fn poll_once(conn: &mut Connection, cfg: &ExitConfig) -> Result<PollStats, ExitError> {
    let positions = store::positions::open_positions(conn)?;
    let mut stats = PollStats::default();

    for position in positions {
        let price = store::events::latest_price(conn, &position.pool)?;
        let Some(cur_px) = price.filter(|p| *p > 0.0) else {
            continue;
        };

        match tick_position(conn, &position, cur_px, cfg)? {
            TickOutcome::Untouched => {}
            TickOutcome::Partials(n) => stats.partials += n,
            TickOutcome::Closed(_) => stats.closed += 1,
        }
    }

    Ok(stats)
}

pub async fn run(cfg: Arc<AppConfig>, mut shutdown: watch::Receiver<bool>) -> Result<(), BoxError> {
    let mut conn = db::open(&cfg.db_path)?;
    let exit_cfg = cfg.exits.clone();
    log::info!(
        "exit_worker: starting (tp x{}, sl x{}, {} TP / {} SL partial levels, no time-stop)",
        exit_cfg.tp_mult,
        exit_cfg.sl_mult,
        exit_cfg.tp_partials.len(),
        exit_cfg.sl_partials.len()
    );

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        match poll_once(&mut conn, &exit_cfg) {
            Ok(_) => {}
            Err(ExitError::Invariant(msg)) => {
                // Halt; the supervisor restarts this worker with backoff.
                return Err(ExitError::Invariant(msg).into());
            }
            Err(ExitError::Db(e)) => log::error!("exit_worker: tick error: {}", e),
        }

        if supervisor::idle(&mut shutdown, exit_cfg.poll_sec).await {
            return Ok(());
        }
    }
}
