//! SQLite connection management.
//!
//! WAL mode for concurrent reads, foreign keys on, transaction discipline
//! for atomic writes. Every logical operation is wrapped in a single
//! IMMEDIATE transaction; nested work uses savepoints.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::Result;
use crate::storage::dialect::Dialect;
use crate::storage::migrations::run_migrations;

/// Default busy timeout (dev baseline; production configs raise it).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// SQLite-backed storage handle.
#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open a database at the given path, apply session settings, run
    /// migrations, and verify integrity.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established, a
    /// migration fails, or integrity verification finds the schema
    /// incomplete (fail-closed startup).
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Open with an explicit busy timeout in milliseconds.
    pub fn open_with_timeout(path: &Path, timeout_ms: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::initialize(conn, timeout_ms)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn, DEFAULT_BUSY_TIMEOUT_MS)
    }

    fn initialize(mut conn: Connection, timeout_ms: u64) -> Result<Self> {
        if std::env::var("DEBUG_SQL").is_ok_and(|v| !v.is_empty() && v != "0") {
            conn.trace(Some(|sql| {
                tracing::debug!(target: "sqlew::sql", "{sql}");
            }));
        }

        conn.busy_timeout(Duration::from_millis(timeout_ms))?;
        for stmt in Dialect::Sqlite.session_init_statements(timeout_ms) {
            // journal_mode returns a row; run through query to drain it.
            let mut prepared = conn.prepare(&stmt)?;
            let _ = prepared.query([])?.next()?;
        }

        run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Read-only access to the underlying connection.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure inside a single IMMEDIATE transaction.
    ///
    /// Commits on `Ok`, rolls back on `Err`.
    pub fn transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Execute a closure inside a savepoint nested in the current
    /// connection state.
    pub fn savepoint<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&rusqlite::Savepoint) -> Result<R>,
    {
        let mut sp = self.conn.savepoint()?;
        sp.set_drop_behavior(rusqlite::DropBehavior::Commit);
        let result = f(&sp)?;
        sp.commit()?;
        Ok(result)
    }
}

/// Insert a row and return its generated ID via `RETURNING`.
pub fn insert_returning_id(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<i64> {
    debug_assert!(sql.to_uppercase().contains("RETURNING"));
    let id = conn.query_row(sql, params, |row| row.get(0))?;
    Ok(id)
}

/// Current Unix timestamp in seconds.
#[must_use]
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Render an epoch-seconds value as an ISO8601 UTC string for projections.
#[must_use]
pub fn ts_to_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map_or_else(String::new, |dt| dt.to_rfc3339())
}
