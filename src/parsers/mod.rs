//! Parsers over `tx_raw`, each with its own slot cursor.
//!
//! All three share the same discipline: consume raw transactions strictly in
//! ascending slot order, decide per row whether to emit, mark the signature
//! in `parsed_sig` either way, and persist the advanced cursor in the same
//! transaction as the batch's writes. An unparseable payload is "nothing to
//! emit", never a pipeline stall.

pub mod authority;
pub mod lp;
pub mod payload;
pub mod swap;

use crate::config::AppConfig;
use crate::store::raw::RawTx;
use crate::{db, store, supervisor, BoxError};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::watch;

const IDLE_SECS: f64 = 1.0;
const DRAIN_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchStats {
    pub inserted: usize,
    pub skipped: usize,
    pub last_slot: i64,
}

/// Process one batch: fetch rows past the cursor, run `handle_row` on each
/// inside a single transaction, and commit the advanced cursor with the
/// writes. Returns `None` when there is nothing past the cursor.
///
/// `handle_row` returns whether an event row was emitted.
pub fn process_batch<F>(
    conn: &mut Connection,
    cursor_name: &str,
    batch: usize,
    handle_row: &mut F,
) -> Result<Option<BatchStats>, BoxError>
where
    F: FnMut(&Connection, &RawTx) -> Result<bool, BoxError>,
{
    let mut cursor = store::cursor::load_slot_cursor(conn, cursor_name)?;
    let rows = store::raw::batch_after_slot(conn, cursor.last_slot, batch)?;
    if rows.is_empty() {
        return Ok(None);
    }

    let mut stats = BatchStats {
        last_slot: cursor.last_slot,
        ..Default::default()
    };

    let tx = conn.transaction()?;
    for row in &rows {
        if row.slot > stats.last_slot {
            stats.last_slot = row.slot;
        }
        if handle_row(&tx, row)? {
            stats.inserted += 1;
        } else {
            stats.skipped += 1;
        }
    }
    cursor.last_slot = stats.last_slot;
    store::cursor::store_slot_cursor(&tx, cursor_name, cursor)?;
    tx.commit()?;

    Ok(Some(stats))
}

/// The shared worker loop: drain batches back-to-back, idle when caught up.
pub async fn run_loop<F>(
    name: &'static str,
    cursor_name: &'static str,
    cfg: Arc<AppConfig>,
    mut shutdown: watch::Receiver<bool>,
    mut handle_row: F,
) -> Result<(), BoxError>
where
    F: FnMut(&Connection, &RawTx) -> Result<bool, BoxError> + Send,
{
    let mut conn = db::open(&cfg.db_path)?;
    let start = store::cursor::load_slot_cursor(&conn, cursor_name)?;
    log::info!("{}: starting at slot {}", name, start.last_slot);

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        match process_batch(&mut conn, cursor_name, cfg.parser_batch, &mut handle_row) {
            Ok(Some(stats)) => {
                log::info!(
                    "{}: inserted {}, skipped {}, last_slot={}",
                    name,
                    stats.inserted,
                    stats.skipped,
                    stats.last_slot
                );
                if supervisor::idle(&mut shutdown, DRAIN_SECS).await {
                    return Ok(());
                }
            }
            Ok(None) => {
                if supervisor::idle(&mut shutdown, IDLE_SECS).await {
                    return Ok(());
                }
            }
            Err(e) => {
                // Abandon the batch; the cursor did not move, so the next
                // iteration retries the same rows.
                log::error!("{}: batch error: {}", name, e);
                if supervisor::idle(&mut shutdown, IDLE_SECS).await {
                    return Ok(());
                }
            }
        }
    }
}
