//! Feature view: maps each logical rule input to an ordered list of
//! candidate columns, resolved once at startup against the live schema.
//!
//! The snapshot row is dynamic (column -> JSON value) because enrichment
//! jobs add columns the worker does not know about; the first non-null
//! candidate wins.

use rusqlite::Connection;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Logical rule inputs and their candidate columns, in preference order.
pub const FEATURE_KEYS: &[(&str, &[&str])] = &[
    ("vc", &["atr15", "atr_pct_15m"]),
    ("ofs", &["cvd_slope_1m", "cvd_slope_5m"]),
    ("lt", &["depth_1p0"]),
    ("wc", &["wc_quality_arrivals"]),
    ("rq", &["watchers_slope"]),
];

#[derive(Debug, Clone)]
pub struct FeatureView {
    resolved: Vec<(&'static str, Vec<String>)>,
}

#[derive(Debug)]
pub enum PickError {
    /// The value exists but is not numeric.
    NotNumeric,
}

impl FeatureView {
    /// Resolve candidate columns against `features_latest` as it exists in
    /// this database. Unknown candidates are dropped up front.
    pub fn resolve(conn: &Connection) -> Result<Self, rusqlite::Error> {
        let mut stmt = conn.prepare("PRAGMA table_info(features_latest)")?;
        let columns: HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<_, _>>()?;

        let resolved = FEATURE_KEYS
            .iter()
            .map(|(logical, candidates)| {
                let present: Vec<String> = candidates
                    .iter()
                    .filter(|c| columns.contains(**c))
                    .map(|c| c.to_string())
                    .collect();
                (*logical, present)
            })
            .collect();

        Ok(Self { resolved })
    }

    /// First non-null candidate value for a logical key, cast to f64.
    ///
    /// `Ok(None)` means missing; `Err` means a value was present but not
    /// castable.
    pub fn pick(&self, logical: &str, row: &Map<String, Value>) -> Result<Option<f64>, PickError> {
        let Some((_, candidates)) = self.resolved.iter().find(|(name, _)| *name == logical) else {
            return Ok(None);
        };

        for column in candidates {
            match row.get(column) {
                None | Some(Value::Null) => continue,
                Some(value) => return cast_f64(value).map(Some),
            }
        }
        Ok(None)
    }
}

fn cast_f64(value: &Value) -> Result<f64, PickError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or(PickError::NotNumeric),
        Value::String(s) => s.trim().parse().map_err(|_| PickError::NotNumeric),
        _ => Err(PickError::NotNumeric),
    }
}
