//! Authority parser: scaffold for mint/freeze permission tracking.
//!
//! Emits a minimal row per transaction referencing a configured program;
//! real authority decoding will fill mint_auth/freeze_auth later.

use crate::config::{AppConfig, ProgramSet};
use crate::parsers::payload::TxPayload;
use crate::store::parsed::ParserFlag;
use crate::store::raw::RawTx;
use crate::{db, store, BoxError};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::watch;

pub const CURSOR_NAME: &str = "parser_auth";

pub fn handle_row(conn: &Connection, programs: &ProgramSet, row: &RawTx) -> Result<bool, BoxError> {
    if store::parsed::is_marked(conn, &row.signature, ParserFlag::Auth)? {
        return Ok(false);
    }

    let emitted = match TxPayload::parse(&row.payload) {
        None => false,
        Some(payload) => match payload.detect_program(programs) {
            None => false,
            Some(pool) => {
                let ts = payload.block_time().unwrap_or_else(db::now_ts);
                store::events::insert_authority(conn, ts, "unknown", Some(&pool))?;
                true
            }
        },
    };

    store::parsed::mark(conn, &row.signature, ParserFlag::Auth)?;
    Ok(emitted)
}

pub async fn run(cfg: Arc<AppConfig>, shutdown: watch::Receiver<bool>) -> Result<(), BoxError> {
    let programs = cfg.programs.clone();
    super::run_loop("parser_authority", CURSOR_NAME, cfg, shutdown, move |conn, row| {
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

    #[test]
    fn test_scaffold_rows_for_known_programs() {
        let temp = NamedTempFile::new().unwrap();
        let mut conn = crate::db::open_and_migrate(temp.path().to_str().unwrap()).unwrap();
        let programs = ProgramSet {
            raydium_amm: DEFAULT_RAYDIUM_AMM.to_string(),
            raydium_clmm: DEFAULT_RAYDIUM_CLMM.to_string(),
            orca_amm: DEFAULT_ORCA_AMM.to_string(),
            orca_whirl: DEFAULT_ORCA_WHIRL.to_string(),
        };

        let known = json!({
            "result": {
                "blockTime": 1_700_000_000,
                "transaction": { "message": { "accountKeys": ["k", DEFAULT_RAYDIUM_CLMM] } }
            }
        })
        .to_string();
        store::raw::insert(&conn, "sig_a", 5, &known).unwrap();
        store::raw::insert(&conn, "sig_b", 6, r#"{"result":{}}"#).unwrap();

        let stats = process_batch(&mut conn, CURSOR_NAME, 500, &mut |c, r| {
            handle_row(c, &programs, r)
        })
        .unwrap()
        .unwrap();
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.skipped, 1);

        let (mint, pool): (String, String) = conn
            .query_row("SELECT mint, pool FROM authority_event", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(mint, "unknown");
        assert_eq!(pool, DEFAULT_RAYDIUM_CLMM);

        assert!(store::parsed::is_marked(&conn, "sig_a", ParserFlag::Auth).unwrap());
        assert!(store::parsed::is_marked(&conn, "sig_b", ParserFlag::Auth).unwrap());
    }
}
