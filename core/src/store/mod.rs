//! SQLite output store.
//!
//! RULE: Only the store talks to the database.
//! RULE: A run is published inside one transaction. Readers see the
//! previous run for a snapshot or the complete new one, never a mix.

use crate::{
    engine::SegmentationRun,
    error::{SegError, SegResult},
};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;

mod classification;
mod reports;

pub use reports::{
    DOC_BEHAVIOR, DOC_DEMOGRAPHICS, DOC_HIGH_SPENDERS, DOC_INGEST, DOC_TOP_CATEGORIES,
    DOC_VENUE_BREAKDOWNS,
};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct SegStore {
    conn: Connection,
}

impl SegStore {
    pub fn open(path: &str) -> SegResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SegResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SegResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_segmentation.sql"))?;
        Ok(())
    }

    // ── Publish ────────────────────────────────────────────────

    /// Write every output table of a run, replacing any earlier run for the
    /// same snapshot. Any failure rolls the whole write back.
    pub fn publish_run(&self, run: &SegmentationRun) -> SegResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        self.delete_run(&run.snapshot_id)?;
        self.insert_run_header(run)?;
        self.insert_rejections(run)?;
        for row in &run.customers {
            self.insert_classification(&run.snapshot_id, row)?;
        }
        for score in run.rfv.global.iter().chain(run.rfv.per_venue.values().flatten()) {
            self.insert_rfv_score(&run.snapshot_id, score)?;
        }
        self.insert_reports(run)?;
        self.insert_events(run)?;

        tx.commit()?;
        log::info!(
            "store: published run {} ({} customers)",
            run.snapshot_id,
            run.customers.len()
        );
        Ok(())
    }

    /// Remove a run and, through the cascading keys, all of its rows.
    pub fn delete_run(&self, snapshot_id: &str) -> SegResult<usize> {
        let n = self.conn.execute(
            "DELETE FROM segmentation_run WHERE snapshot_id = ?1",
            params![snapshot_id],
        )?;
        Ok(n)
    }

    fn insert_run_header(&self, run: &SegmentationRun) -> SegResult<()> {
        self.conn.execute(
            "INSERT INTO segmentation_run (
                snapshot_id, reference_date, customers, venues, selective_threshold,
                transactions_read, transactions_accepted, customers_read,
                customers_accepted, records_excluded
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.snapshot_id,
                run.reference_date.map(|d| d.to_string()),
                run.customers.len() as i64,
                run.thresholds.len() as i64,
                run.selective_threshold,
                run.ingest.transactions_read as i64,
                run.ingest.transactions_accepted as i64,
                run.ingest.customers_read as i64,
                run.ingest.customers_accepted as i64,
                run.ingest.excluded() as i64,
            ],
        )?;
        Ok(())
    }

    fn insert_rejections(&self, run: &SegmentationRun) -> SegResult<()> {
        for (reason, count) in &run.ingest.rejections {
            self.conn.execute(
                "INSERT INTO record_rejection (snapshot_id, reason, count) VALUES (?1, ?2, ?3)",
                params![run.snapshot_id, label_of(reason)?, *count as i64],
            )?;
        }
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn run_exists(&self, snapshot_id: &str) -> SegResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM segmentation_run WHERE snapshot_id = ?1",
                params![snapshot_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn rejection_count(&self, snapshot_id: &str, reason: &str) -> SegResult<usize> {
        let n: Option<i64> = self
            .conn
            .query_row(
                "SELECT count FROM record_rejection WHERE snapshot_id = ?1 AND reason = ?2",
                params![snapshot_id, reason],
                |row| row.get(0),
            )
            .optional()?;
        Ok(n.unwrap_or(0) as usize)
    }

    /// Number of rows a table holds for one snapshot. Table names are
    /// fixed identifiers, never user input.
    pub fn count_rows(&self, table: &str, snapshot_id: &str) -> SegResult<usize> {
        const TABLES: [&str; 9] = [
            "record_rejection",
            "customer_classification",
            "rfv_score",
            "venue_summary",
            "profile_summary",
            "profile_venue",
            "persona_summary",
            "report_document",
            "event_log",
        ];
        if !TABLES.contains(&table) {
            return Err(SegError::Other(anyhow::anyhow!("unknown output table {table}")));
        }
        let n: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE snapshot_id = ?1"),
            params![snapshot_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

// ── Label helpers ──────────────────────────────────────────────

/// The serde name of a unit enum variant, used as the stored label.
fn label_of<T: serde::Serialize>(value: &T) -> SegResult<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// Inverse of `label_of`, for use inside row mappers.
fn from_label<T: DeserializeOwned>(idx: usize, label: String) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(label)).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
