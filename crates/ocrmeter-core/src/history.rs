use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};

use crate::error::OcrmeterError;
use crate::metrics::{summarize, PerformanceSummary, TestMetrics};

// ---------------------------------------------------------------------------
// HistoryRow — one persisted run
// ---------------------------------------------------------------------------

/// One persisted test run, as read back from the store.
///
/// Rows are immutable once written; the store is append-only. The summary is
/// denormalized at append time so historical queries never need to recompute
/// statistics from the raw arrays.
#[derive(Debug, Clone)]
pub struct HistoryRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub test_name: String,
    pub deployment_url: String,
    pub response_times: Vec<f64>,
    pub success_count: u64,
    pub error_count: u64,
    pub total_requests: u64,
    pub duration: f64,
    pub errors: Vec<String>,
    pub metadata: serde_json::Value,
    pub summary: PerformanceSummary,
}

// ---------------------------------------------------------------------------
// HistoryStore
// ---------------------------------------------------------------------------

/// Append-only SQLite log of past test runs.
///
/// The store is the sole synchronization point for concurrent sessions: the
/// single connection is held behind a mutex and every append is one atomic
/// INSERT, so parallel writers cannot lose each other's rows.
pub struct HistoryStore {
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// Open (creating if necessary) the database at `path` and ensure the
    /// schema exists. Parent directories are created as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OcrmeterError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, OcrmeterError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), OcrmeterError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS performance_runs (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 test_name TEXT NOT NULL,
                 deployment_url TEXT,
                 response_times TEXT,
                 success_count INTEGER,
                 error_count INTEGER,
                 total_requests INTEGER,
                 duration REAL,
                 errors TEXT,
                 metadata TEXT,
                 summary_stats TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_timestamp ON performance_runs(timestamp);
             CREATE INDEX IF NOT EXISTS idx_test_name ON performance_runs(test_name);",
        )?;
        Ok(())
    }

    /// Append one record, denormalizing its computed summary alongside the
    /// raw observations. Never updates or deletes existing rows.
    pub fn append(
        &self,
        metrics: &TestMetrics,
        deployment_url: &str,
    ) -> Result<(), OcrmeterError> {
        let summary = summarize(metrics);
        let response_times = serde_json::to_string(&metrics.response_times)?;
        let errors = serde_json::to_string(&metrics.errors)?;
        let metadata = serde_json::to_string(&metrics.metadata)?;
        let summary_stats = serde_json::to_string(&summary)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO performance_runs
             (timestamp, test_name, deployment_url, response_times, success_count,
              error_count, total_requests, duration, errors, metadata, summary_stats)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                metrics.timestamp.to_rfc3339(),
                metrics.test_name,
                deployment_url,
                response_times,
                metrics.success_count,
                metrics.error_count,
                metrics.total_requests,
                metrics.duration,
                errors,
                metadata,
                summary_stats,
            ],
        )?;
        Ok(())
    }

    /// Return rows whose timestamp falls within the last `days` days,
    /// optionally filtered to an exact test name, newest first.
    pub fn query(
        &self,
        test_name: Option<&str>,
        days: i64,
    ) -> Result<Vec<HistoryRow>, OcrmeterError> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let conn = self.lock()?;

        let mut rows = Vec::new();
        match test_name {
            Some(name) => {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, test_name, deployment_url, response_times,
                            success_count, error_count, total_requests, duration,
                            errors, metadata, summary_stats
                     FROM performance_runs
                     WHERE test_name = ?1 AND timestamp > ?2
                     ORDER BY timestamp DESC, id DESC",
                )?;
                let mapped = stmt.query_map(params![name, cutoff], raw_row)?;
                for raw in mapped {
                    rows.push(parse_row(raw?)?);
                }
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, timestamp, test_name, deployment_url, response_times,
                            success_count, error_count, total_requests, duration,
                            errors, metadata, summary_stats
                     FROM performance_runs
                     WHERE timestamp > ?1
                     ORDER BY timestamp DESC, id DESC",
                )?;
                let mapped = stmt.query_map(params![cutoff], raw_row)?;
                for raw in mapped {
                    rows.push(parse_row(raw?)?);
                }
            }
        }
        Ok(rows)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, OcrmeterError> {
        self.conn
            .lock()
            .map_err(|_| OcrmeterError::Internal("history store mutex poisoned".to_string()))
    }
}

/// Column values as stored, before JSON columns are parsed.
struct RawRow {
    id: i64,
    timestamp: String,
    test_name: String,
    deployment_url: String,
    response_times: String,
    success_count: u64,
    error_count: u64,
    total_requests: u64,
    duration: f64,
    errors: String,
    metadata: String,
    summary_stats: String,
}

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        test_name: row.get(2)?,
        deployment_url: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        response_times: row.get(4)?,
        success_count: row.get(5)?,
        error_count: row.get(6)?,
        total_requests: row.get(7)?,
        duration: row.get(8)?,
        errors: row.get(9)?,
        metadata: row.get(10)?,
        summary_stats: row.get(11)?,
    })
}

fn parse_row(raw: RawRow) -> Result<HistoryRow, OcrmeterError> {
    let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
        .map_err(|e| OcrmeterError::Internal(format!("bad stored timestamp: {e}")))?
        .with_timezone(&Utc);
    Ok(HistoryRow {
        id: raw.id,
        timestamp,
        test_name: raw.test_name,
        deployment_url: raw.deployment_url,
        response_times: serde_json::from_str(&raw.response_times)?,
        success_count: raw.success_count,
        error_count: raw.error_count,
        total_requests: raw.total_requests,
        duration: raw.duration,
        errors: serde_json::from_str(&raw.errors)?,
        metadata: serde_json::from_str(&raw.metadata)?,
        summary: serde_json::from_str(&raw.summary_stats)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
