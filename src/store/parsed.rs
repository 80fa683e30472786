//! `parsed_sig`: per-parser watermark flags.
//!
//! A parser marks its flag for every signature it consumes, emission or not,
//! so replays after a cursor reset converge instead of duplicating events.

use rusqlite::{params, Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserFlag {
    Swap,
    Lp,
    Auth,
}

impl ParserFlag {
    fn column(self) -> &'static str {
        match self {
            ParserFlag::Swap => "has_swap",
            ParserFlag::Lp => "has_lp",
            ParserFlag::Auth => "has_auth",
        }
    }
}

pub fn mark(conn: &Connection, signature: &str, flag: ParserFlag) -> Result<(), rusqlite::Error> {
    let sql = match flag {
        ParserFlag::Swap => {
            "INSERT INTO parsed_sig (signature, has_swap) VALUES (?1, 1)
             ON CONFLICT(signature) DO UPDATE SET has_swap = 1"
        }
        ParserFlag::Lp => {
            "INSERT INTO parsed_sig (signature, has_lp) VALUES (?1, 1)
             ON CONFLICT(signature) DO UPDATE SET has_lp = 1"
        }
        ParserFlag::Auth => {
            "INSERT INTO parsed_sig (signature, has_auth) VALUES (?1, 1)
             ON CONFLICT(signature) DO UPDATE SET has_auth = 1"
        }
    };
    conn.execute(sql, params![signature])?;
    Ok(())
}

pub fn is_marked(
    conn: &Connection,
    signature: &str,
    flag: ParserFlag,
) -> Result<bool, rusqlite::Error> {
    let sql = format!(
        "SELECT {} FROM parsed_sig WHERE signature = ?1",
        flag.column()
    );
    let marked: Option<i64> = conn
        .query_row(&sql, params![signature], |row| row.get(0))
        .optional()?;
    Ok(marked.unwrap_or(0) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::NamedTempFile;

    #[test]
    fn test_flags_are_independent() {
        let temp = NamedTempFile::new().unwrap();
        let conn = db::open_and_migrate(temp.path().to_str().unwrap()).unwrap();

        mark(&conn, "sig1", ParserFlag::Swap).unwrap();
        assert!(is_marked(&conn, "sig1", ParserFlag::Swap).unwrap());
        assert!(!is_marked(&conn, "sig1", ParserFlag::Lp).unwrap());
        assert!(!is_marked(&conn, "sig1", ParserFlag::Auth).unwrap());

        // Marking another flag upserts the same row
        mark(&conn, "sig1", ParserFlag::Lp).unwrap();
        assert!(is_marked(&conn, "sig1", ParserFlag::Swap).unwrap());
        assert!(is_marked(&conn, "sig1", ParserFlag::Lp).unwrap());

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM parsed_sig", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unknown_signature_is_unmarked() {
        let temp = NamedTempFile::new().unwrap();
        let conn = db::open_and_migrate(temp.path().to_str().unwrap()).unwrap();
        assert!(!is_marked(&conn, "missing", ParserFlag::Swap).unwrap());
    }
}
