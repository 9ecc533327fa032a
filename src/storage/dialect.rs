//! Dialect-correct SQL fragment generation for SQLite, MySQL, and
//! PostgreSQL.
//!
//! The live connection is always SQLite (rusqlite); the other dialects are
//! exercised by `db:dump`, which emits scripts that must install cleanly on
//! a fresh MySQL/MariaDB or PostgreSQL schema. All boolean and enum values
//! travel as small integers; timestamps are Unix epoch seconds.

use std::fmt::Write as _;

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Sqlite,
    Mysql,
    Postgres,
}

impl Dialect {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Postgres => "postgresql",
        }
    }

    /// Quote an identifier (table or column name).
    #[must_use]
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Self::Mysql => format!("`{ident}`"),
            Self::Sqlite | Self::Postgres => format!("\"{ident}\""),
        }
    }

    /// Quote a string literal, doubling embedded quotes.
    #[must_use]
    pub fn quote_str(self, value: &str) -> String {
        let escaped = value.replace('\'', "''");
        match self {
            // MySQL additionally treats backslash as an escape character.
            Self::Mysql => format!("'{}'", escaped.replace('\\', "\\\\")),
            Self::Sqlite | Self::Postgres => format!("'{escaped}'"),
        }
    }

    /// Autoincrementing integer primary key column definition.
    #[must_use]
    pub const fn autoincrement_pk(self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Mysql => "BIGINT PRIMARY KEY AUTO_INCREMENT",
            Self::Postgres => "BIGSERIAL PRIMARY KEY",
        }
    }

    /// Column type for free-form text.
    #[must_use]
    pub const fn text_type(self) -> &'static str {
        match self {
            Self::Sqlite | Self::Postgres => "TEXT",
            Self::Mysql => "LONGTEXT",
        }
    }

    /// Column type for a unique-indexable string (MySQL cannot put a
    /// unique index on an unbounded text column).
    #[must_use]
    pub const fn keyed_text_type(self) -> &'static str {
        match self {
            Self::Sqlite | Self::Postgres => "TEXT",
            Self::Mysql => "VARCHAR(512)",
        }
    }

    /// Upsert statement: `INSERT ... ON CONFLICT ... DO UPDATE`
    /// (SQLite/PostgreSQL) or `ON DUPLICATE KEY UPDATE` (MySQL).
    #[must_use]
    pub fn upsert_sql(
        self,
        table: &str,
        cols: &[&str],
        conflict_cols: &[&str],
        update_cols: &[&str],
    ) -> String {
        let col_list = cols
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=cols.len())
            .map(|i| self.placeholder(i))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({col_list}) VALUES ({placeholders})",
            self.quote_ident(table)
        );

        match self {
            Self::Sqlite | Self::Postgres => {
                let conflict = conflict_cols
                    .iter()
                    .map(|c| self.quote_ident(c))
                    .collect::<Vec<_>>()
                    .join(", ");
                if update_cols.is_empty() {
                    let _ = write!(sql, " ON CONFLICT ({conflict}) DO NOTHING");
                } else {
                    let updates = update_cols
                        .iter()
                        .map(|c| {
                            format!("{q} = excluded.{q}", q = self.quote_ident(c))
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    let _ = write!(sql, " ON CONFLICT ({conflict}) DO UPDATE SET {updates}");
                }
            }
            Self::Mysql => {
                let updates = if update_cols.is_empty() {
                    // No-op assignment; MySQL has no DO NOTHING form.
                    let first = self.quote_ident(conflict_cols[0]);
                    format!("{first} = {first}")
                } else {
                    update_cols
                        .iter()
                        .map(|c| {
                            format!("{q} = VALUES({q})", q = self.quote_ident(c))
                        })
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let _ = write!(sql, " ON DUPLICATE KEY UPDATE {updates}");
            }
        }

        sql
    }

    /// `INSERT ... RETURNING` support. MySQL reads back via
    /// `LAST_INSERT_ID()` bound to the current connection instead.
    #[must_use]
    pub const fn supports_insert_returning(self) -> bool {
        matches!(self, Self::Sqlite | Self::Postgres)
    }

    /// Positional parameter placeholder (1-based).
    #[must_use]
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::Sqlite => format!("?{n}"),
            Self::Mysql => "?".to_string(),
            Self::Postgres => format!("${n}"),
        }
    }

    /// Extract a JSON field as text.
    #[must_use]
    pub fn json_extract(self, col: &str, path: &str) -> String {
        match self {
            Self::Sqlite => format!("json_extract({col}, '$.{path}')"),
            Self::Mysql => format!("JSON_UNQUOTE(JSON_EXTRACT({col}, '$.{path}'))"),
            Self::Postgres => format!("({col}::jsonb ->> '{path}')"),
        }
    }

    /// Build a JSON object from `(key, value_expr)` pairs.
    #[must_use]
    pub fn json_build_object(self, fields: &[(&str, &str)]) -> String {
        let args = fields
            .iter()
            .map(|(k, v)| format!("'{k}', {v}"))
            .collect::<Vec<_>>()
            .join(", ");
        match self {
            Self::Sqlite => format!("json_object({args})"),
            Self::Mysql => format!("JSON_OBJECT({args})"),
            Self::Postgres => format!("json_build_object({args})"),
        }
    }

    /// Aggregate a column into a separator-joined string.
    #[must_use]
    pub fn string_agg(self, col: &str, sep: &str) -> String {
        match self {
            Self::Sqlite => format!("group_concat({col}, '{sep}')"),
            Self::Mysql => format!("GROUP_CONCAT({col} SEPARATOR '{sep}')"),
            Self::Postgres => format!("string_agg({col}, '{sep}')"),
        }
    }

    /// Concatenate value expressions.
    #[must_use]
    pub fn concat(self, values: &[&str]) -> String {
        match self {
            Self::Sqlite | Self::Postgres => values.join(" || "),
            Self::Mysql => format!("CONCAT({})", values.join(", ")),
        }
    }

    /// Current time as Unix epoch seconds.
    #[must_use]
    pub const fn current_timestamp(self) -> &'static str {
        match self {
            Self::Sqlite => "CAST(strftime('%s','now') AS INTEGER)",
            Self::Mysql => "UNIX_TIMESTAMP()",
            Self::Postgres => "CAST(EXTRACT(EPOCH FROM now()) AS BIGINT)",
        }
    }

    /// Render an epoch-seconds column as an ISO-ish datetime string.
    #[must_use]
    pub fn from_unix_epoch(self, col: &str) -> String {
        match self {
            Self::Sqlite => format!("datetime({col}, 'unixepoch')"),
            Self::Mysql => format!("FROM_UNIXTIME({col})"),
            Self::Postgres => format!("to_timestamp({col})"),
        }
    }

    /// Convert a datetime expression to epoch seconds.
    #[must_use]
    pub fn to_unix_epoch(self, expr: &str) -> String {
        match self {
            Self::Sqlite => format!("CAST(strftime('%s', {expr}) AS INTEGER)"),
            Self::Mysql => format!("UNIX_TIMESTAMP({expr})"),
            Self::Postgres => format!("CAST(EXTRACT(EPOCH FROM {expr}) AS BIGINT)"),
        }
    }

    /// Statement probing for a table's existence in the information schema.
    ///
    /// MySQL table-name case sensitivity depends on the host platform;
    /// this is observable behavior, not something the adapter papers over.
    #[must_use]
    pub fn table_exists_sql(self) -> &'static str {
        match self {
            Self::Sqlite => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table','view') AND name = ?1"
            }
            Self::Mysql => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
            }
            Self::Postgres => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
        }
    }

    /// Session initialization statements applied after connect.
    ///
    /// SQLite: WAL + foreign keys + synchronous + busy timeout (live).
    /// MySQL: UTF8MB4 + UTC + strict mode (script preamble).
    /// PostgreSQL: nothing beyond the schema search path.
    #[must_use]
    pub fn session_init_statements(self, busy_timeout_ms: u64) -> Vec<String> {
        match self {
            Self::Sqlite => vec![
                "PRAGMA journal_mode = WAL".to_string(),
                "PRAGMA foreign_keys = ON".to_string(),
                "PRAGMA synchronous = NORMAL".to_string(),
                format!("PRAGMA busy_timeout = {busy_timeout_ms}"),
            ],
            Self::Mysql => vec![
                "SET NAMES utf8mb4".to_string(),
                "SET time_zone = '+00:00'".to_string(),
                "SET sql_mode = 'STRICT_ALL_TABLES'".to_string(),
            ],
            Self::Postgres => vec![],
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::Mysql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(format!(
                "unknown dialect '{other}' (expected sqlite, mysql, postgresql)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_sqlite_uses_on_conflict() {
        let sql = Dialect::Sqlite.upsert_sql(
            "m_agents",
            &["name", "last_active_ts"],
            &["name"],
            &["last_active_ts"],
        );
        assert!(sql.contains("ON CONFLICT (\"name\") DO UPDATE SET"));
        assert!(sql.contains("excluded.\"last_active_ts\""));
    }

    #[test]
    fn upsert_mysql_uses_duplicate_key() {
        let sql = Dialect::Mysql.upsert_sql(
            "m_agents",
            &["name", "last_active_ts"],
            &["name"],
            &["last_active_ts"],
        );
        assert!(sql.contains("ON DUPLICATE KEY UPDATE"));
        assert!(sql.contains("VALUES(`last_active_ts`)"));
    }

    #[test]
    fn upsert_do_nothing_forms() {
        let sql = Dialect::Postgres.upsert_sql("m_tags", &["name"], &["name"], &[]);
        assert!(sql.ends_with("DO NOTHING"));

        let sql = Dialect::Mysql.upsert_sql("m_tags", &["name"], &["name"], &[]);
        assert!(sql.contains("`name` = `name`"));
    }

    #[test]
    fn json_and_aggregation_fragments() {
        assert_eq!(
            Dialect::Sqlite.json_extract("metadata", "branch"),
            "json_extract(metadata, '$.branch')"
        );
        assert_eq!(
            Dialect::Postgres.json_extract("metadata", "branch"),
            "(metadata::jsonb ->> 'branch')"
        );
        assert_eq!(
            Dialect::Mysql.string_agg("t.name", ","),
            "GROUP_CONCAT(t.name SEPARATOR ',')"
        );
        assert_eq!(
            Dialect::Sqlite.concat(&["a", "b"]),
            "a || b"
        );
        assert_eq!(
            Dialect::Mysql.concat(&["a", "b"]),
            "CONCAT(a, b)"
        );
    }

    #[test]
    fn epoch_fragments_round_trip_textually() {
        for d in [Dialect::Sqlite, Dialect::Mysql, Dialect::Postgres] {
            assert!(!d.current_timestamp().is_empty());
            assert!(d.from_unix_epoch("ts").contains("ts"));
            assert!(d.to_unix_epoch("created").contains("created"));
        }
    }

    #[test]
    fn string_quoting_escapes_per_dialect() {
        assert_eq!(Dialect::Sqlite.quote_str("it's"), "'it''s'");
        assert_eq!(Dialect::Mysql.quote_str(r"a\b'c"), r"'a\\b''c'");
    }

    #[test]
    fn dialect_parses_aliases() {
        assert_eq!("mariadb".parse::<Dialect>().unwrap(), Dialect::Mysql);
        assert_eq!("postgresql".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert!("oracle".parse::<Dialect>().is_err());
    }
}
