//! Swap parser: infers swap direction, amounts, and price from token
//! balance deltas.
//!
//! The inference never writes synthetic zeros: when a transaction does not
//! expose a usable opposite-sign mint pair, the signature is marked and the
//! cursor advances with nothing emitted.

use crate::config::{AppConfig, ProgramSet};
use crate::parsers::payload::{TxPayload, WRAPPED_NATIVE_MINT};
use crate::store::events::SwapEvent;
use crate::store::parsed::ParserFlag;
use crate::store::raw::RawTx;
use crate::{db, store, BoxError};
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

pub const CURSOR_NAME: &str = "parser_swap";

/// An inferred swap: base is the mint received, quote the mint spent.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapInference {
    pub base_mint: String,
    pub quote_mint: String,
    /// +1 buy, -1 sell, 0 unknown (relative to the wrapped native mint).
    pub side: i64,
    pub price: f64,
    pub base_amt: f64,
    pub quote_amt: f64,
}

/// Pick the two largest opposite-sign mint deltas and orient them.
pub fn infer_swap(deltas: &HashMap<String, f64>) -> Option<SwapInference> {
    let mut ranked: Vec<(&str, f64)> = deltas.iter().map(|(m, d)| (m.as_str(), *d)).collect();
    ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

    let (first_mint, first_delta) = *ranked.first()?;
    let (second_mint, second_delta) = ranked
        .iter()
        .skip(1)
        .copied()
        .find(|(_, delta)| (*delta > 0.0) != (first_delta > 0.0))?;

    let ((base_mint, base_delta), (quote_mint, quote_delta)) = if first_delta > 0.0 {
        ((first_mint, first_delta), (second_mint, second_delta))
    } else {
        ((second_mint, second_delta), (first_mint, first_delta))
    };

    let base_amt = base_delta;
    let quote_amt = -quote_delta;
    if base_amt <= 0.0 || quote_amt <= 0.0 {
        return None;
    }

    let side = if base_mint != WRAPPED_NATIVE_MINT && quote_mint == WRAPPED_NATIVE_MINT {
        1
    } else if base_mint == WRAPPED_NATIVE_MINT {
        -1
    } else {
        0
    };

    Some(SwapInference {
        base_mint: base_mint.to_string(),
        quote_mint: quote_mint.to_string(),
        side,
        price: quote_amt / base_amt,
        base_amt,
        quote_amt,
    })
}

/// Per-row handler used by the batch loop. Returns whether a swap event was
/// emitted; marks `has_swap` in every path.
pub fn handle_row(conn: &Connection, programs: &ProgramSet, row: &RawTx) -> Result<bool, BoxError> {
    if store::parsed::is_marked(conn, &row.signature, ParserFlag::Swap)? {
        return Ok(false);
    }

    let emitted = match TxPayload::parse(&row.payload) {
        None => false,
        Some(payload) => {
            let ts = payload.block_time().unwrap_or_else(db::now_ts);
            match infer_swap(&payload.mint_deltas()) {
                None => false,
                Some(swap) => {
                    let pool = payload
                        .detect_program(programs)
                        .unwrap_or_else(|| format!("{}-{}", swap.base_mint, swap.quote_mint));
                    store::events::insert_swap(
                        conn,
                        &SwapEvent {
                            ts,
                            sig: row.signature.clone(),
                            slot: row.slot,
                            pool,
                            token: swap.base_mint.clone(),
                            side: swap.side,
                            price: swap.price,
                            base_amt: swap.base_amt,
                            quote_amt: swap.quote_amt,
                        },
                    )?;
                    true
                }
            }
        }
    };

    store::parsed::mark(conn, &row.signature, ParserFlag::Swap)?;
    Ok(emitted)
}

pub async fn run(cfg: Arc<AppConfig>, shutdown: watch::Receiver<bool>) -> Result<(), BoxError> {
    let programs = cfg.programs.clone();
    super::run_loop("parser_swap", CURSOR_NAME, cfg, shutdown, move |conn, row| {
        handle_row(conn, &programs, row)
    })
    .await
}
