//! `tx_raw`: resolved transactions, payload stored verbatim.

use rusqlite::{params, Connection};

#[derive(Debug, Clone)]
pub struct RawTx {
    pub signature: String,
    pub slot: i64,
    pub payload: String,
}

pub fn insert(
    conn: &Connection,
    signature: &str,
    slot: i64,
    payload: &str,
) -> Result<bool, rusqlite::Error> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tx_raw (signature, slot, payload) VALUES (?1, ?2, ?3)",
        params![signature, slot, payload],
    )?;
    Ok(inserted > 0)
}

/// Fetch the next parser batch, strictly ascending by slot.
pub fn batch_after_slot(
    conn: &Connection,
    last_slot: i64,
    limit: usize,
) -> Result<Vec<RawTx>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT signature, slot, payload FROM tx_raw
         WHERE slot > ?1
         ORDER BY slot ASC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![last_slot, limit as i64], |row| {
        Ok(RawTx {
            signature: row.get(0)?,
            slot: row.get(1)?,
            payload: row.get(2)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::NamedTempFile;

    #[test]
    fn test_batch_ordering_and_bound() {
        let temp = NamedTempFile::new().unwrap();
        let conn = db::open_and_migrate(temp.path().to_str().unwrap()).unwrap();

        insert(&conn, "s3", 30, "{}").unwrap();
        insert(&conn, "s1", 10, "{}").unwrap();
        insert(&conn, "s2", 20, "{}").unwrap();
        // Duplicate signature is ignored
        assert!(!insert(&conn, "s1", 10, "{}").unwrap());

        let batch = batch_after_slot(&conn, 10, 10).unwrap();
        let slots: Vec<i64> = batch.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![20, 30]);

        let bounded = batch_after_slot(&conn, 0, 2).unwrap();
        assert_eq!(bounded.len(), 2);
        assert_eq!(bounded[0].slot, 10);
    }
}
