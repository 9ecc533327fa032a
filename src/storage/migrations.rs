//! Ordered, idempotent migrations with integrity verification.
//!
//! Migrations are partitioned into three layers run in order: bootstrap
//! (masters, transactions, indexes, enum seeds, views), enhancements
//! (column additions, denormalized indexes, CASCADE tightening), and
//! upgrades (version-specific schema evolution). Every `up` probes before
//! create/alter, so re-executing any migration on a database that already
//! reflects it is a no-op. The `schema_migrations` table records applied
//! ids; if it is missing but schema objects exist, re-running the full
//! sequence converges without duplicating rows.

use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::storage::dialect::Dialect;
use crate::storage::schema::{
    index_statements, seed_statements, table_statements, view_statements, REQUIRED_COLUMNS,
    REQUIRED_TABLES, REQUIRED_VIEWS,
};

/// Which lifecycle layer a migration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationLayer {
    Bootstrap,
    Enhancement,
    Upgrade,
}

/// A single migration with an identifier and up/down functions.
pub struct Migration {
    pub id: &'static str,
    pub layer: MigrationLayer,
    pub up: fn(&Connection) -> Result<()>,
    pub down: fn(&Connection) -> Result<()>,
}

/// All migrations in execution order.
#[must_use]
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            id: "001_create_masters",
            layer: MigrationLayer::Bootstrap,
            up: up_create_masters,
            down: down_create_masters,
        },
        Migration {
            id: "002_create_transactions",
            layer: MigrationLayer::Bootstrap,
            up: up_create_transactions,
            down: down_create_transactions,
        },
        Migration {
            id: "003_create_indexes",
            layer: MigrationLayer::Bootstrap,
            up: up_create_indexes,
            down: down_noop,
        },
        Migration {
            id: "004_seed_enums",
            layer: MigrationLayer::Bootstrap,
            up: up_seed_enums,
            down: down_noop,
        },
        Migration {
            id: "005_create_views",
            layer: MigrationLayer::Bootstrap,
            up: up_create_views,
            down: down_create_views,
        },
        Migration {
            id: "101_project_metadata_column",
            layer: MigrationLayer::Enhancement,
            up: up_project_metadata_column,
            down: down_noop,
        },
        Migration {
            id: "102_backfill_tag_index",
            layer: MigrationLayer::Enhancement,
            up: up_backfill_tag_index,
            down: down_noop,
        },
        Migration {
            id: "103_dependency_cascade",
            layer: MigrationLayer::Enhancement,
            up: up_dependency_cascade,
            down: down_noop,
        },
        Migration {
            id: "201_tag_index_multi_project",
            layer: MigrationLayer::Upgrade,
            up: up_tag_index_multi_project,
            down: down_noop,
        },
    ]
}

// ── Probes ────────────────────────────────────────────────────

/// Whether a table or view exists.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        Dialect::Sqlite.table_exists_sql(),
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Whether a view exists.
pub fn view_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'view' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Whether a column exists on a table.
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether any foreign key on `table` declares `ON DELETE CASCADE`.
fn has_cascade_fk(conn: &Connection, table: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let on_delete: String = row.get(6)?;
        if on_delete.eq_ignore_ascii_case("CASCADE") {
            return Ok(true);
        }
    }
    Ok(false)
}

// ── Runner ────────────────────────────────────────────────────

/// Run all pending migrations, then verify schema integrity.
///
/// Safe to call on every open. Already-applied migrations (recorded in
/// `schema_migrations`) are skipped; unrecorded migrations still probe
/// before touching the schema, which makes partial-state recovery (objects
/// exist, bookkeeping lost) converge without data loss.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let applied: std::collections::HashSet<String> = conn
        .prepare("SELECT version FROM schema_migrations")?
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<_, _>>()?;

    for migration in migrations() {
        if applied.contains(migration.id) {
            continue;
        }

        info!(id = migration.id, "Applying migration");
        (migration.up)(conn)?;

        conn.execute(
            "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![migration.id, chrono::Utc::now().timestamp()],
        )?;
    }

    verify_integrity(conn)
}

/// Verify required tables, columns, and views after migration.
///
/// On mismatch, returns [`Error::SchemaMismatch`] enumerating every
/// missing item with remediation hints; the caller refuses to serve.
pub fn verify_integrity(conn: &Connection) -> Result<()> {
    let mut missing = Vec::new();

    for table in REQUIRED_TABLES {
        if !table_exists(conn, table)? {
            missing.push(format!("missing table: {table}"));
        }
    }
    for view in REQUIRED_VIEWS {
        if !view_exists(conn, view)? {
            missing.push(format!("missing view: {view}"));
        }
    }
    for (table, columns) in REQUIRED_COLUMNS {
        if !table_exists(conn, table)? {
            continue; // already reported above
        }
        for column in *columns {
            if !column_exists(conn, table, column)? {
                missing.push(format!("missing column: {table}.{column}"));
            }
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    warn!(count = missing.len(), "Schema integrity check failed");
    let mut report = missing.join("\n");
    report.push_str(
        "\nRemediation: back up the database file and re-run migrations on a copy, \
         point SQLEW_DB_PATH at a fresh location, or restore a known-good backup.",
    );
    Err(Error::SchemaMismatch { report })
}

// ── Bootstrap ─────────────────────────────────────────────────

fn up_create_masters(conn: &Connection) -> Result<()> {
    for (name, sql) in table_statements(Dialect::Sqlite) {
        if name.starts_with("m_") && !table_exists(conn, name)? {
            conn.execute_batch(&sql)?;
        }
    }
    Ok(())
}

fn down_create_masters(conn: &Connection) -> Result<()> {
    for (name, _) in table_statements(Dialect::Sqlite).iter().rev() {
        if name.starts_with("m_") {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {name}"))?;
        }
    }
    Ok(())
}

fn up_create_transactions(conn: &Connection) -> Result<()> {
    for (name, sql) in table_statements(Dialect::Sqlite) {
        if name.starts_with("t_") && !table_exists(conn, name)? {
            conn.execute_batch(&sql)?;
        }
    }
    Ok(())
}

fn down_create_transactions(conn: &Connection) -> Result<()> {
    for (name, _) in table_statements(Dialect::Sqlite).iter().rev() {
        if name.starts_with("t_") {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {name}"))?;
        }
    }
    Ok(())
}

fn up_create_indexes(conn: &Connection) -> Result<()> {
    for sql in index_statements(Dialect::Sqlite) {
        conn.execute_batch(&sql)?;
    }
    Ok(())
}

fn up_seed_enums(conn: &Connection) -> Result<()> {
    for sql in seed_statements(Dialect::Sqlite) {
        conn.execute_batch(&sql)?;
    }
    Ok(())
}

fn up_create_views(conn: &Connection) -> Result<()> {
    for (_, sql) in view_statements(Dialect::Sqlite) {
        conn.execute_batch(&sql)?;
    }
    Ok(())
}

fn down_create_views(conn: &Connection) -> Result<()> {
    for (name, _) in view_statements(Dialect::Sqlite) {
        conn.execute_batch(&format!("DROP VIEW IF EXISTS {name}"))?;
    }
    Ok(())
}

fn down_noop(_conn: &Connection) -> Result<()> {
    Ok(())
}

// ── Enhancements ──────────────────────────────────────────────

/// Databases created before project metadata landed lack the column.
fn up_project_metadata_column(conn: &Connection) -> Result<()> {
    if !column_exists(conn, "m_projects", "metadata")? {
        conn.execute_batch("ALTER TABLE m_projects ADD COLUMN metadata TEXT")?;
    }
    Ok(())
}

/// The tag index is a total function of `t_decision_tags`; backfill any
/// junction rows the index is missing.
fn up_backfill_tag_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "INSERT OR IGNORE INTO t_tag_index (tag_name, key_id, project_id)
         SELECT tg.name, dt.key_id, dt.project_id
         FROM t_decision_tags dt
         JOIN m_tags tg ON tg.id = dt.tag_id",
    )?;
    Ok(())
}

/// SQLite cannot modify FK clauses in place; tighten
/// `t_task_dependencies` to CASCADE with the copy-and-rename idiom.
fn up_dependency_cascade(conn: &Connection) -> Result<()> {
    if has_cascade_fk(conn, "t_task_dependencies")? {
        return Ok(());
    }

    conn.execute_batch(
        "PRAGMA foreign_keys = OFF;
         CREATE TABLE t_task_dependencies_new (
             project_id BIGINT NOT NULL REFERENCES m_projects(id),
             blocker_task_id BIGINT NOT NULL REFERENCES t_tasks(id) ON DELETE CASCADE,
             blocked_task_id BIGINT NOT NULL REFERENCES t_tasks(id) ON DELETE CASCADE,
             created_ts BIGINT NOT NULL,
             PRIMARY KEY (blocker_task_id, blocked_task_id)
         );
         INSERT INTO t_task_dependencies_new
             SELECT project_id, blocker_task_id, blocked_task_id, created_ts
             FROM t_task_dependencies;
         DROP TABLE t_task_dependencies;
         ALTER TABLE t_task_dependencies_new RENAME TO t_task_dependencies;
         CREATE INDEX IF NOT EXISTS idx_task_deps_blocked
             ON t_task_dependencies (blocked_task_id);
         PRAGMA foreign_keys = ON;",
    )?;
    Ok(())
}

// ── Upgrades ──────────────────────────────────────────────────

/// Single-project databases predate `project_id` on the tag index.
fn up_tag_index_multi_project(conn: &Connection) -> Result<()> {
    if column_exists(conn, "t_tag_index", "project_id")? {
        return Ok(());
    }
    conn.execute_batch(
        "ALTER TABLE t_tag_index ADD COLUMN project_id BIGINT NOT NULL DEFAULT 1",
    )?;
    Ok(())
}
