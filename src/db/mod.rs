//! Database module for the time-series lists
//!
//! Every series is an append-only list of serialized JSON records,
//! addressed with Redis-style list indices (negative values count from
//! the tail). Two backends are provided:
//! - `Database`: SQLite, used by the running meter
//! - `MemoryStore`: in-process, used by tests and the demo replay

mod memory;

pub use memory::MemoryStore;

use crate::core::{Error, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// List operations the rollup pipeline relies on
pub trait SeriesStore {
    /// Append a serialized record to the tail of `series`
    fn push(&mut self, series: &str, record: &str) -> Result<()>;

    /// Records between `start` and `stop`, both inclusive
    fn range(&self, series: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Keep only records between `start` and `stop`, both inclusive
    fn trim(&mut self, series: &str, start: i64, stop: i64) -> Result<()>;

    /// Current record count of `series`
    fn len(&self, series: &str) -> Result<usize>;

    fn is_empty(&self, series: &str) -> Result<bool> {
        Ok(self.len(series)? == 0)
    }
}

/// Resolve list indices against a length.
///
/// Returns the inclusive `(first, last)` positions, or `None` when the
/// range selects nothing.
pub fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { len + start } else { start }.max(0);
    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);

    if len == 0 || start > stop || start >= len {
        return None;
    }

    Some((start as usize, stop as usize))
}

/// SQLite-backed series store
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at the default location
    pub fn new() -> Result<Self> {
        Self::open(&Self::db_path()?)
    }

    /// Open (or create) a database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;

        log::info!("Opened series database at {}", path.display());
        Ok(db)
    }

    /// Database that lives only as long as this value
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Get the database file path
    pub fn db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))?;

        Ok(data_dir.join("power-meter").join("series.db"))
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS series_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                series TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_series_records_series ON series_records(series, id);
            "#,
        )?;

        Ok(())
    }
}

impl SeriesStore for Database {
    fn push(&mut self, series: &str, record: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO series_records (series, payload) VALUES (?1, ?2)",
            params![series, record],
        )?;
        Ok(())
    }

    fn range(&self, series: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let Some((first, last)) = resolve_range(self.len(series)?, start, stop) else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            "SELECT payload FROM series_records
             WHERE series = ?1
             ORDER BY id ASC
             LIMIT ?2 OFFSET ?3",
        )?;

        let records = stmt
            .query_map(
                params![series, (last - first + 1) as i64, first as i64],
                |row| row.get(0),
            )?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(records)
    }

    fn trim(&mut self, series: &str, start: i64, stop: i64) -> Result<()> {
        let len = self.len(series)?;
        let Some((first, last)) = resolve_range(len, start, stop) else {
            self.conn.execute(
                "DELETE FROM series_records WHERE series = ?1",
                params![series],
            )?;
            return Ok(());
        };

        // Tail first, so the head offset still refers to the original list
        if last + 1 < len {
            self.conn.execute(
                "DELETE FROM series_records
                 WHERE series = ?1
                   AND id > (SELECT id FROM series_records WHERE series = ?1
                             ORDER BY id LIMIT 1 OFFSET ?2)",
                params![series, last as i64],
            )?;
        }

        if first > 0 {
            self.conn.execute(
                "DELETE FROM series_records
                 WHERE series = ?1
                   AND id < (SELECT id FROM series_records WHERE series = ?1
                             ORDER BY id LIMIT 1 OFFSET ?2)",
                params![series, first as i64],
            )?;
        }

        Ok(())
    }

    fn len(&self, series: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM series_records WHERE series = ?1",
            params![series],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
