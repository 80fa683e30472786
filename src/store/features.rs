//! `features_latest`: one snapshot row per pool.
//!
//! The upsert only touches the columns the feature worker owns; candidate
//! columns fed by external enrichment survive the update. The detector reads
//! rows dynamically (column name -> JSON value) because its rule resolves
//! feature names against whatever the live schema provides.

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone)]
pub struct FeatureUpdate {
    pub pool: String,
    pub ts: i64,
    pub atr_pct_15m: Option<f64>,
    pub atr_pct_24h: Option<f64>,
    pub vc_ratio: Option<f64>,
    pub cvd_slope_5m: Option<f64>,
    pub obs: i64,
}

pub fn upsert(conn: &Connection, update: &FeatureUpdate) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO features_latest (pool, ts, atr_pct_15m, atr_pct_24h, vc_ratio, cvd_slope_5m, obs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(pool) DO UPDATE SET
             ts = excluded.ts,
             atr_pct_15m = excluded.atr_pct_15m,
             atr_pct_24h = excluded.atr_pct_24h,
             vc_ratio = excluded.vc_ratio,
             cvd_slope_5m = excluded.cvd_slope_5m,
             obs = excluded.obs",
        params![
            update.pool,
            update.ts,
            update.atr_pct_15m,
            update.atr_pct_24h,
            update.vc_ratio,
            update.cvd_slope_5m,
            update.obs,
        ],
    )?;
    Ok(())
}

/// Read the newest feature rows as dynamic column maps.
pub fn latest_rows(
    conn: &Connection,
    limit: usize,
) -> Result<Vec<Map<String, Value>>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT * FROM features_latest ORDER BY ts DESC LIMIT ?1")?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

    let mut out = Vec::new();
    let mut rows = stmt.query(params![limit as i64])?;
    while let Some(row) = rows.next()? {
        let mut map = Map::new();
        for (idx, name) in columns.iter().enumerate() {
            map.insert(name.clone(), value_ref_to_json(row.get_ref(idx)?));
        }
        out.push(map);
    }
    Ok(out)
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}
