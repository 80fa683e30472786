//! Append-only market events: `swap_event`, `lp_event`, `authority_event`.

use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone)]
pub struct SwapEvent {
    pub ts: i64,
    pub sig: String,
    pub slot: i64,
    pub pool: String,
    pub token: String,
    /// +1 buy, -1 sell, 0 unknown.
    pub side: i64,
    pub price: f64,
    pub base_amt: f64,
    pub quote_amt: f64,
}

/// A swap row as the feature worker reads it back, ascending by time.
#[derive(Debug, Clone, Copy)]
pub struct SwapSample {
    pub ts: i64,
    pub price: f64,
    pub side: i64,
    pub base_amt: f64,
}

pub fn insert_swap(conn: &Connection, event: &SwapEvent) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO swap_event (ts, sig, slot, pool, token, side, price, base_amt, quote_amt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.ts,
            event.sig,
            event.slot,
            event.pool,
            event.token,
            event.side,
            event.price,
            event.base_amt,
            event.quote_amt,
        ],
    )?;
    Ok(())
}

/// LP scaffold row; reserves stay NULL until a real decoder fills them.
pub fn insert_lp(
    conn: &Connection,
    sig: &str,
    ts: i64,
    slot: i64,
    pool: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO lp_event (sig, ts, slot, pool, x_reserve, y_reserve, fee_bps, kind)
         VALUES (?1, ?2, ?3, ?4, NULL, NULL, NULL, 'update')",
        params![sig, ts, slot, pool],
    )?;
    Ok(())
}

pub fn insert_authority(
    conn: &Connection,
    ts: i64,
    mint: &str,
    pool: Option<&str>,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO authority_event (ts, mint, pool, mint_auth, freeze_auth)
         VALUES (?1, ?2, ?3, NULL, NULL)",
        params![ts, mint, pool],
    )?;
    Ok(())
}

/// Latest observed swap price for a pool; the exit engine's price source.
pub fn latest_price(conn: &Connection, pool: &str) -> Result<Option<f64>, rusqlite::Error> {
    conn.query_row(
        "SELECT price FROM swap_event
         WHERE pool = ?1
         ORDER BY ts DESC, id DESC
         LIMIT 1",
        params![pool],
        |row| row.get(0),
    )
    .optional()
}

/// Pools with any swap or LP activity since `cutoff` (0 = all time).
pub fn active_pools_since(conn: &Connection, cutoff: i64) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT pool FROM (
             SELECT pool, ts FROM swap_event WHERE ts > ?1
             UNION ALL
             SELECT pool, ts FROM lp_event WHERE ts > ?1
         )
         GROUP BY pool",
    )?;
    let rows = stmt.query_map(params![cutoff], |row| row.get(0))?;
    rows.collect()
}

/// Swap samples for one pool since `cutoff`, ascending, as feature input.
pub fn pool_swaps_since(
    conn: &Connection,
    pool: &str,
    cutoff: i64,
) -> Result<Vec<SwapSample>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT ts, price, side, base_amt FROM swap_event
         WHERE pool = ?1 AND ts > ?2
         ORDER BY ts ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![pool, cutoff], |row| {
        Ok(SwapSample {
            ts: row.get(0)?,
            price: row.get(1)?,
            side: row.get(2)?,
            base_amt: row.get(3)?,
        })
    })?;
    rows.collect()
}
