//! Poolflow CLI: one-shot diagnostics or the full supervised pipeline.
//!
//! `poolflow diag`              - DB table listing + a few live notifications
//! `poolflow full --exec MODE`  - every worker + health, until interrupted
//!
//! With no subcommand, `diag` runs.

use poolflow::config::AppConfig;
use poolflow::executor::{ExecMode, LiveStubExecutor, PaperExecutor, SignalExecutor};
use poolflow::{db, detector, exit_engine, features, health, ingest, parsers, resolver, supervisor};
use poolflow::BoxError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const DIAG_LOG_LIMIT: usize = 10;
const SHUTDOWN_GRACE_SECS: u64 = 2;

enum Command {
    Diag,
    Full(ExecMode),
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    match args.first().map(String::as_str) {
        None | Some("diag") => Ok(Command::Diag),
        Some("full") => {
            let mut mode = ExecMode::Paper;
            if let Some(idx) = args.iter().position(|a| a == "--exec") {
                let value = args
                    .get(idx + 1)
                    .ok_or_else(|| "--exec requires a value (paper|live|none)".to_string())?;
                mode = ExecMode::parse(value)
                    .ok_or_else(|| format!("unknown exec mode: {} (expected paper|live|none)", value))?;
            }
            Ok(Command::Full(mode))
        }
        Some(other) => Err(format!(
            "unknown command: {} (usage: poolflow [diag | full --exec paper|live|none])",
            other
        )),
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // NOTE: Workaround for rustls provider selection with rustls-tls clients
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .ok();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(2);
        }
    };

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            log::error!("fatal: {}", e);
            std::process::exit(1);
        }
    };

    let result = match command {
        Command::Diag => run_diag(cfg).await,
        Command::Full(mode) => run_full(cfg, mode).await,
    };
    if let Err(e) = result {
        log::error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run_diag(cfg: Arc<AppConfig>) -> Result<(), BoxError> {
    log::info!("[DIAG] checking DB at {}", cfg.db_path);
    let conn = db::open_and_migrate(&cfg.db_path)?;
    let tables = db::list_tables(&conn)?;
    log::info!("[DIAG] DB OK. Tables: {:?}", tables);

    log::info!("[DIAG] checking log feed at {}", cfg.rpc_ws);
    let received = ingest::diag_ws_check(&cfg, DIAG_LOG_LIMIT).await?;
    log::info!("[DIAG] feed OK. Received {} notifications.", received);
    Ok(())
}

async fn run_full(cfg: Arc<AppConfig>, mode: ExecMode) -> Result<(), BoxError> {
    log::info!("🚀 runner: starting full pipeline (executor={:?})", mode);

    // Migrate once up front so every worker sees the full schema
    db::open_and_migrate(&cfg.db_path)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    // Dependency order: ingest -> resolve -> parse -> features -> detector
    // -> executor -> exit. Each worker is independently restartable.
    let c = cfg.clone();
    handles.push(supervisor::spawn_supervised("ingestor", shutdown_rx.clone(), move |sd| {
        ingest::run(c.clone(), sd)
    }));
    let c = cfg.clone();
    handles.push(supervisor::spawn_supervised("resolver", shutdown_rx.clone(), move |sd| {
        resolver::run(c.clone(), sd)
    }));
    let c = cfg.clone();
    handles.push(supervisor::spawn_supervised("parser_swap", shutdown_rx.clone(), move |sd| {
        parsers::swap::run(c.clone(), sd)
    }));
    let c = cfg.clone();
    handles.push(supervisor::spawn_supervised("parser_lp", shutdown_rx.clone(), move |sd| {
        parsers::lp::run(c.clone(), sd)
    }));
    let c = cfg.clone();
    handles.push(supervisor::spawn_supervised(
        "parser_authority",
        shutdown_rx.clone(),
        move |sd| parsers::authority::run(c.clone(), sd),
    ));
    let c = cfg.clone();
    handles.push(supervisor::spawn_supervised("feature_worker", shutdown_rx.clone(), move |sd| {
        features::run(c.clone(), sd)
    }));
    let c = cfg.clone();
    handles.push(supervisor::spawn_supervised("detector", shutdown_rx.clone(), move |sd| {
        detector::run(c.clone(), sd)
    }));

    match mode {
        ExecMode::Paper => {
            let c = cfg.clone();
            let executor: Arc<dyn SignalExecutor> = Arc::new(PaperExecutor);
            handles.push(supervisor::spawn_supervised(
                "executor_paper",
                shutdown_rx.clone(),
                move |sd| poolflow::executor::run(c.clone(), executor.clone(), sd),
            ));
        }
        ExecMode::Live => {
            let c = cfg.clone();
            let executor: Arc<dyn SignalExecutor> = Arc::new(LiveStubExecutor);
            handles.push(supervisor::spawn_supervised(
                "executor_live",
                shutdown_rx.clone(),
                move |sd| poolflow::executor::run(c.clone(), executor.clone(), sd),
            ));
        }
        ExecMode::None => {
            log::info!("runner: no executor attached (exec=none)");
        }
    }

    // The exit engine always runs: open positions need TP/SL regardless of
    // which executor opened them.
    let c = cfg.clone();
    handles.push(supervisor::spawn_supervised("exit_worker", shutdown_rx.clone(), move |sd| {
        exit_engine::run(c.clone(), sd)
    }));

    log::info!("✅ runner: started {} workers; health every 5s", handles.len());

    // Health ticker on the main task until ctrl-c
    let health_cfg = cfg.clone();
    let health_rx = shutdown_rx.clone();
    tokio::select! {
        _ = health::run_ticker(health_cfg, health_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("runner: interrupt received, stopping");
        }
    }

    // Propagate shutdown, give workers time to finish their batch, then cut
    // anything still running.
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_SECS)).await;
    for handle in &handles {
        handle.abort();
    }
    log::info!("runner: stopped");
    Ok(())
}
