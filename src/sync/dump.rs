//! SQL script emission for migration between engines.
//!
//! Reads the live SQLite database and emits a script in the target
//! dialect: optional schema DDL (tables, indexes, seeds, views) followed
//! by data INSERTs in FK-safe table order. Emitted MySQL/MariaDB and
//! PostgreSQL scripts install on a fresh, empty schema.

use rusqlite::types::ValueRef;
use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::storage::dialect::Dialect;
use crate::storage::schema::{
    index_statements, seed_statements, table_statements, view_statements, REQUIRED_TABLES,
};

/// Conflict handling for emitted INSERT statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Plain INSERT; duplicates fail the script.
    #[default]
    Error,
    /// Skip duplicate rows.
    Ignore,
    /// Overwrite duplicate rows.
    Replace,
}

impl std::str::FromStr for OnConflict {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "error" => Ok(Self::Error),
            "ignore" => Ok(Self::Ignore),
            "replace" => Ok(Self::Replace),
            other => Err(format!(
                "unknown on-conflict mode '{other}' (expected error, ignore, replace)"
            )),
        }
    }
}

/// Options for a dump run.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    pub dialect: Dialect,
    /// Restrict to these tables; empty means all.
    pub tables: Vec<String>,
    pub on_conflict: OnConflict,
    /// Skip DDL; emit data only.
    pub exclude_schema: bool,
}

/// Produce the full statement list for a dump.
pub fn dump_statements(conn: &Connection, opts: &DumpOptions) -> Result<Vec<String>> {
    if opts.dialect == Dialect::Postgres && opts.on_conflict == OnConflict::Replace {
        return Err(Error::Validation(
            "on-conflict=replace is not supported for postgresql; use ignore".to_string(),
        ));
    }

    let wanted: Vec<&str> = if opts.tables.is_empty() {
        REQUIRED_TABLES.to_vec()
    } else {
        let known: Vec<&str> = REQUIRED_TABLES.to_vec();
        for table in &opts.tables {
            if !known.contains(&table.as_str()) {
                return Err(Error::Validation(format!("unknown table '{table}'")));
            }
        }
        REQUIRED_TABLES
            .iter()
            .copied()
            .filter(|t| opts.tables.iter().any(|w| w == t))
            .collect()
    };

    let mut statements = Vec::new();

    // Session preamble (UTF8MB4 + UTC + strict mode for MySQL; nothing for
    // PostgreSQL; SQLite scripts are applied by this binary which sets its
    // own pragmas).
    if opts.dialect == Dialect::Mysql {
        statements.extend(opts.dialect.session_init_statements(0));
    }

    if !opts.exclude_schema {
        for (name, sql) in table_statements(opts.dialect) {
            if wanted.contains(&name) {
                statements.push(sql);
            }
        }
        if opts.tables.is_empty() {
            statements.extend(index_statements(opts.dialect));
            for (_, sql) in view_statements(opts.dialect) {
                statements.push(sql);
            }
        }
        // Seeds are insert-if-absent; emit them only when dumping data
        // would not (the data section below already carries seeded rows).
        if !wanted
            .iter()
            .any(|t| matches!(*t, "m_layers" | "m_task_statuses" | "m_constraint_categories"))
        {
            statements.extend(seed_statements(opts.dialect));
        }
    }

    for table in wanted {
        statements.extend(dump_table(conn, table, opts)?);
    }

    Ok(statements)
}

fn dump_table(conn: &Connection, table: &str, opts: &DumpOptions) -> Result<Vec<String>> {
    let d = opts.dialect;
    let mut stmt = conn.prepare(&format!("SELECT * FROM {table}"))?;
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .map(ToString::to_string)
        .collect();
    let column_list = columns
        .iter()
        .map(|c| d.quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");

    let verb = match (opts.on_conflict, d) {
        (OnConflict::Error, _) => "INSERT INTO".to_string(),
        (OnConflict::Ignore, Dialect::Sqlite) => "INSERT OR IGNORE INTO".to_string(),
        (OnConflict::Ignore, Dialect::Mysql) => "INSERT IGNORE INTO".to_string(),
        (OnConflict::Ignore, Dialect::Postgres) => "INSERT INTO".to_string(),
        (OnConflict::Replace, Dialect::Sqlite) => "INSERT OR REPLACE INTO".to_string(),
        (OnConflict::Replace, Dialect::Mysql) => "REPLACE INTO".to_string(),
        (OnConflict::Replace, Dialect::Postgres) => unreachable!("rejected in dump_statements"),
    };
    let suffix = match (opts.on_conflict, d) {
        (OnConflict::Ignore, Dialect::Postgres) => " ON CONFLICT DO NOTHING",
        _ => "",
    };

    let mut statements = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(render_literal(d, row.get_ref(index)?));
        }
        statements.push(format!(
            "{verb} {} ({column_list}) VALUES ({}){suffix}",
            d.quote_ident(table),
            values.join(", ")
        ));
    }
    Ok(statements)
}

fn render_literal(d: Dialect, value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => d.quote_str(&String::from_utf8_lossy(t)),
        ValueRef::Blob(b) => {
            let hex: String = b.iter().map(|byte| format!("{byte:02x}")).collect();
            match d {
                Dialect::Sqlite | Dialect::Mysql => format!("x'{hex}'"),
                Dialect::Postgres => format!("'\\x{hex}'"),
            }
        }
    }
}

/// Split a statement list into parts of at most `max_statements` each.
#[must_use]
pub fn split_statements(statements: &[String], max_statements: usize) -> Vec<Vec<String>> {
    if max_statements == 0 {
        return vec![statements.to_vec()];
    }
    statements
        .chunks(max_statements)
        .map(<[String]>::to_vec)
        .collect()
}
