//! Log ingestor: subscribes to the node's log feed for every configured
//! program and enqueues observed signatures into `tx_queue`.
//!
//! The worker holds no unpersisted state: a notification either lands in the
//! store or is lost with the connection, in which case the resolver never
//! hears about it and nothing downstream is affected. Stream errors tear the
//! connection down and reconnect after a fixed delay, reissuing every
//! subscription.

pub mod ws;

use crate::config::AppConfig;
use crate::{db, store, BoxError};
use futures_util::{SinkExt, StreamExt};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const RECONNECT_SECS: f64 = 5.0;

pub async fn run(cfg: Arc<AppConfig>, mut shutdown: watch::Receiver<bool>) -> Result<(), BoxError> {
    let mut conn = db::open(&cfg.db_path)?;
    log::info!("ingestor: subscribing, writing signatures into tx_queue");

    let mut inserted: u64 = 0;
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return Ok(());
        }

        // Alternate to the backup endpoint (when configured) after a failure
        let url = match (&cfg.rpc_ws_backup, attempt % 2) {
            (Some(backup), 1) => backup.as_str(),
            _ => cfg.rpc_ws.as_str(),
        };

        match stream_once(&cfg, url, &mut conn, &mut shutdown, &mut inserted).await {
            Ok(()) => return Ok(()), // shutdown requested
            Err(e) => {
                log::warn!(
                    "ingestor: stream error: {}; reconnecting in {}s",
                    e,
                    RECONNECT_SECS
                );
            }
        }

        attempt = attempt.wrapping_add(1);
        if crate::supervisor::idle(&mut shutdown, RECONNECT_SECS).await {
            return Ok(());
        }
    }
}

/// One connection lifetime: subscribe to every program, pump notifications
/// until the stream dies (`Err`) or shutdown is requested (`Ok`).
///
/// Takes the connection as `&mut` so the future stays `Send`.
async fn stream_once(
    cfg: &AppConfig,
    url: &str,
    conn: &mut Connection,
    shutdown: &mut watch::Receiver<bool>,
    inserted: &mut u64,
) -> Result<(), BoxError> {
    let (ws_stream, _) = connect_async(url).await?;
    let (mut write, mut read) = ws_stream.split();

    for (idx, program_id) in cfg.programs.ids().iter().enumerate() {
        let request = ws::logs_subscribe_request(program_id, idx + 1);
        write.send(Message::Text(request.to_string())).await?;
    }
    log::info!("ingestor: {} subscriptions issued", cfg.programs.ids().len());

    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let Some(note) = ws::parse_log_notification(&text) else {
                        continue;
                    };
                    let result = store::queue::enqueue(
                        conn,
                        &note.signature,
                        note.program_id.as_deref(),
                        note.slot,
                        db::now_ts(),
                    );
                    match result {
                        Ok(true) => {
                            *inserted += 1;
                            if *inserted % 10 == 0 {
                                log::info!("ingestor: queued {} signatures so far", inserted);
                            }
                        }
                        Ok(false) => {} // duplicate, already queued
                        Err(e) => log::warn!(
                            "ingestor: insert error for {}: {}",
                            note.signature,
                            e
                        ),
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    write.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err("stream closed by remote".into());
                }
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(_)) => {} // binary/pong frames carry nothing for us
            }
        }
    }
}

/// One-shot feed check for `diag`: subscribe and report the first `limit`
/// notifications.
pub async fn diag_ws_check(cfg: &AppConfig, limit: usize) -> Result<usize, BoxError> {
    let (ws_stream, _) = connect_async(cfg.rpc_ws.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    for (idx, program_id) in cfg.programs.ids().iter().enumerate() {
        let request = ws::logs_subscribe_request(program_id, idx + 1);
        write.send(Message::Text(request.to_string())).await?;
    }

    let mut printed = 0;
    while printed < limit {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Some(note) = ws::parse_log_notification(&text) {
                    printed += 1;
                    log::info!(
                        "[DIAG] log #{} program={} slot={} lines={}",
                        printed,
                        note.program_id.as_deref().unwrap_or("?"),
                        note.slot.unwrap_or(-1),
                        note.log_lines
                    );
                }
            }
            Some(Ok(Message::Ping(payload))) => write.send(Message::Pong(payload)).await?,
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(_)) => {}
        }
    }
    Ok(printed)
}
