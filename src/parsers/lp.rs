//! LP parser: emits a liquidity-pool event for transactions referencing a
//! configured AMM program. Reserves are not inferred here; they stay NULL.

use crate::config::{AppConfig, ProgramSet};
use crate::parsers::payload::TxPayload;
use crate::store::parsed::ParserFlag;
use crate::store::raw::RawTx;
use crate::{db, store, BoxError};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::watch;

pub const CURSOR_NAME: &str = "parser_lp";

pub fn handle_row(conn: &Connection, programs: &ProgramSet, row: &RawTx) -> Result<bool, BoxError> {
    if store::parsed::is_marked(conn, &row.signature, ParserFlag::Lp)? {
        return Ok(false);
    }

    let emitted = match TxPayload::parse(&row.payload) {
        None => false,
        Some(payload) => match payload.detect_program(programs) {
            None => false,
            Some(pool) => {
                let ts = payload.block_time().unwrap_or_else(db::now_ts);
                store::events::insert_lp(conn, &row.signature, ts, row.slot, &pool)?;
                true
            }
        },
    };

    store::parsed::mark(conn, &row.signature, ParserFlag::Lp)?;
    Ok(emitted)
}

pub async fn run(cfg: Arc<AppConfig>, shutdown: watch::Receiver<bool>) -> Result<(), BoxError> {
    let programs = cfg.programs.clone();
    super::run_loop("parser_lp", CURSOR_NAME, cfg, shutdown, move |conn, row| {
        handle_row(conn, &programs, row)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DEFAULT_ORCA_AMM, DEFAULT_ORCA_WHIRL, DEFAULT_RAYDIUM_AMM, DEFAULT_RAYDIUM_CLMM,
    };
    use crate::parsers::process_batch;
    use serde_json::json;
    use tempfile::NamedTempFile;

    fn programs() -> ProgramSet {
        ProgramSet {
            raydium_amm: DEFAULT_RAYDIUM_AMM.to_string(),
            raydium_clmm: DEFAULT_RAYDIUM_CLMM.to_string(),
            orca_amm: DEFAULT_ORCA_AMM.to_string(),
            orca_whirl: DEFAULT_ORCA_WHIRL.to_string(),
        }
    }

    fn payload(keys: serde_json::Value) -> String {
        json!({
            "result": {
                "blockTime": 1_700_000_000,
                "transaction": { "message": { "accountKeys": keys } }
            }
        })
        .to_string()
    }

    #[test]
    fn test_gated_on_program_set() {
        let temp = NamedTempFile::new().unwrap();
        let mut conn = crate::db::open_and_migrate(temp.path().to_str().unwrap()).unwrap();
        let programs = programs();

        store::raw::insert(
            &conn,
            "sig_known",
            10,
            &payload(json!(["x", DEFAULT_ORCA_WHIRL])),
        )
        .unwrap();
        store::raw::insert(&conn, "sig_unknown", 11, &payload(json!(["x", "y"]))).unwrap();

        let stats = process_batch(&mut conn, CURSOR_NAME, 500, &mut |c, r| {
            handle_row(c, &programs, r)
        })
        .unwrap()
        .unwrap();

        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);

        let (pool, kind, reserves): (String, String, Option<f64>) = conn
            .query_row(
                "SELECT pool, kind, x_reserve FROM lp_event WHERE sig = 'sig_known'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(pool, DEFAULT_ORCA_WHIRL);
        assert_eq!(kind, "update");
        assert!(reserves.is_none());

        // Both rows watermarked, cursor past both slots
        assert!(store::parsed::is_marked(&conn, "sig_unknown", ParserFlag::Lp).unwrap());
        assert_eq!(
            store::cursor::load_slot_cursor(&conn, CURSOR_NAME)
                .unwrap()
                .last_slot,
            11
        );
    }
}
