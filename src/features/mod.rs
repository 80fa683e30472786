//! Feature worker: computes rolling volatility and order-flow features per
//! active pool and upserts `features_latest`.
//!
//! Reruns over the same swap events converge to the same snapshot (pure
//! computation + upsert). A pool without enough observations is skipped so
//! its previous snapshot survives.

pub mod metrics;

use crate::config::AppConfig;
use crate::store::events::SwapSample;
use crate::store::features::FeatureUpdate;
use crate::{db, store, supervisor, BoxError};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::watch;

const POLL_SECS: f64 = 10.0;
const ACTIVE_WINDOW_SECS: i64 = 24 * 3600;
const LOAD_WINDOW_SECS: i64 = 36 * 3600;
const ATR_SHORT_SECS: i64 = 15 * 60;
const ATR_LONG_SECS: i64 = 24 * 3600;
const MIN_OBS: usize = 3;

/// Feature snapshot for one pool, or `None` when the sample is too thin.
pub fn compute(pool: &str, samples: &[SwapSample], now: i64) -> Option<FeatureUpdate> {
    if samples.len() < MIN_OBS {
        return None;
    }

    let prices_since = |cutoff: i64| -> Vec<f64> {
        samples
            .iter()
            .filter(|s| s.ts > cutoff)
            .map(|s| s.price)
            .collect()
    };
    let atr_pct_15m = metrics::atr_pct(&prices_since(now - ATR_SHORT_SECS));
    let atr_pct_24h = metrics::atr_pct(&prices_since(now - ATR_LONG_SECS));

    let signed_volumes: Vec<f64> = samples
        .iter()
        .map(|s| s.side as f64 * s.base_amt)
        .collect();

    Some(FeatureUpdate {
        pool: pool.to_string(),
        ts: now,
        atr_pct_15m,
        atr_pct_24h,
        vc_ratio: metrics::vc_ratio(atr_pct_15m, atr_pct_24h),
        cvd_slope_5m: metrics::cvd_slope(&signed_volumes),
        obs: samples.len() as i64,
    })
}

/// Recompute and upsert features for the given pools; returns how many rows
/// were written (skipped pools keep their previous snapshot).
pub fn refresh_pools(conn: &Connection, pools: &[String], now: i64) -> Result<usize, BoxError> {
    let mut written = 0;
    for pool in pools {
        let samples = store::events::pool_swaps_since(conn, pool, now - LOAD_WINDOW_SECS)?;
        if let Some(update) = compute(pool, &samples, now) {
            store::features::upsert(conn, &update)?;
            written += 1;
        }
    }
    Ok(written)
}

pub async fn run(cfg: Arc<AppConfig>, mut shutdown: watch::Receiver<bool>) -> Result<(), BoxError> {
    let conn = db::open(&cfg.db_path)?;
    log::info!("feature_worker: starting (24h active window + startup backfill)");

    // One-time backfill so features_latest is not empty after a long gap
    let now = db::now_ts();
    let all_pools = store::events::active_pools_since(&conn, 0)?;
    let backfilled = refresh_pools(&conn, &all_pools, now)?;
    log::info!("feature_worker: backfilled {} pools (all-time)", backfilled);

    loop {
        if supervisor::idle(&mut shutdown, POLL_SECS).await {
            return Ok(());
        }

        let now = db::now_ts();
        let pools = match store::events::active_pools_since(&conn, now - ACTIVE_WINDOW_SECS) {
            Ok(pools) => pools,
            Err(e) => {
                log::error!("feature_worker: pool scan failed: {}", e);
                continue;
            }
        };
        match refresh_pools(&conn, &pools, now) {
            Ok(written) => {
                log::debug!(
                    "feature_worker: upserted {} of {} active pools",
                    written,
                    pools.len()
                )
            }
            Err(e) => log::error!("feature_worker: refresh failed: {}", e),
        }
    }
}
