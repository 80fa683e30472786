//! Signature resolver: claims queued signatures, fetches full transaction
//! payloads over HTTP JSON-RPC, and persists them into `tx_raw`.
//!
//! Multiple resolver instances are safe: the claim is a single guarded
//! UPDATE, and the raw insert is conflict-ignored. A signature whose fetch
//! keeps failing is parked as `error` after the retry budget.

use crate::config::AppConfig;
use crate::rpc::RpcClient;
use crate::{db, store, supervisor, BoxError};
use rusqlite::Connection;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

const IDLE_SECS: f64 = 1.0;
const FAILURE_SECS: f64 = 0.5;

pub async fn run(cfg: Arc<AppConfig>, mut shutdown: watch::Receiver<bool>) -> Result<(), BoxError> {
    let mut conn = db::open(&cfg.db_path)?;
    let rpc = RpcClient::new(&cfg.rpc_http)?;
    log::info!("resolver: polling tx_queue and resolving into tx_raw");

    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        let Some(claimed) = store::queue::claim_next(&conn)? else {
            if supervisor::idle(&mut shutdown, IDLE_SECS).await {
                return Ok(());
            }
            continue;
        };

        match rpc.get_transaction(&claimed.signature).await {
            Ok(payload) => {
                let slot = claimed
                    .slot
                    .or_else(|| payload.pointer("/result/slot").and_then(Value::as_i64))
                    .unwrap_or(0);
                persist_resolved(&mut conn, &claimed.signature, slot, &payload)?;
            }
            Err(e) => {
                log::warn!("resolver: fetch failed for {}: {}", claimed.signature, e);
                store::queue::mark_failed(
                    &conn,
                    &claimed.signature,
                    &e.to_string(),
                    cfg.resolver_max_retries,
                )?;
                if supervisor::idle(&mut shutdown, FAILURE_SECS).await {
                    return Ok(());
                }
            }
        }
    }
}

/// Store the payload and flip the queue row to `resolved` atomically, so a
/// crash between the two cannot strand a resolved payload in `resolving`.
fn persist_resolved(
    conn: &mut Connection,
    signature: &str,
    slot: i64,
    payload: &Value,
) -> Result<(), rusqlite::Error> {
    let body = payload.to_string();
    let tx = conn.transaction()?;
    store::raw::insert(&tx, signature, slot, &body)?;
    store::queue::mark_resolved(&tx, signature)?;
    tx.commit()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_persist_resolved_is_atomic_and_idempotent() {
        let temp = NamedTempFile::new().unwrap();
        let mut conn = db::open_and_migrate(temp.path().to_str().unwrap()).unwrap();

        store::queue::enqueue(&conn, "sig1", None, Some(7), 100).unwrap();
        store::queue::claim_next(&conn).unwrap().unwrap();

        let payload = serde_json::json!({"result": {"slot": 7, "meta": {}}});
        persist_resolved(&mut conn, "sig1", 7, &payload).unwrap();

        let status: String = conn
            .query_row("SELECT status FROM tx_queue WHERE signature = 'sig1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(status, "resolved");

        let stored: String = conn
            .query_row("SELECT payload FROM tx_raw WHERE signature = 'sig1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        let roundtrip: Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(roundtrip, payload);

        // A second resolution of the same signature is conflict-ignored
        persist_resolved(&mut conn, "sig1", 7, &payload).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tx_raw", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
