//! Storage & coordination engine.
//!
//! # Submodules
//!
//! - [`dialect`] - Dialect-correct SQL fragments for SQLite/MySQL/PostgreSQL
//! - [`schema`] - Table, index, seed, and view definitions
//! - [`migrations`] - Ordered idempotent migrations + integrity verification
//! - [`sqlite`] - Live connection management
//! - [`registry`] - Master-ID get-or-create helpers
//! - [`project`] - Project binding
//! - [`decisions`] - Decision set/get/search/versioning and templates
//! - [`constraints`] - Constraint store
//! - [`tasks`] - Task graph with state machine and dependency cycle checks
//! - [`files`] - File-change recording
//! - [`messages`] - Agent messages
//! - [`retention`] - Weekend-aware cleanup
//! - [`suggest`] - Similarity scoring and three-tier duplicate detection
//! - [`batch`] - Atomic / best-effort batch executor

pub mod batch;
pub mod constraints;
pub mod decisions;
pub mod dialect;
pub mod files;
pub mod messages;
pub mod migrations;
pub mod project;
pub mod registry;
pub mod retention;
pub mod schema;
pub mod sqlite;
pub mod suggest;
pub mod tasks;

pub use batch::{BatchItemResult, BatchOutcome, BATCH_LIMIT};
pub use dialect::Dialect;
pub use sqlite::Storage;
pub use suggest::{Suggestion, SuggestionTier};

use std::path::Path;

use rusqlite::{Connection, Transaction};

use crate::config::Settings;
use crate::error::Result;
use crate::model::enums::DetectionSource;

/// Engine handle: the storage connection bound to a project and resolved
/// settings. Set up once at startup, passed explicitly to every caller.
#[derive(Debug)]
pub struct Engine {
    store: Storage,
    project_id: i64,
    settings: Settings,
}

impl Engine {
    /// Open the engine against a database file and bind the project.
    ///
    /// Runs migrations (fail-closed), binds the project row (creating it
    /// on first use), and performs startup retention (logged, never
    /// fatal).
    pub fn open(
        db_path: &Path,
        project_name: &str,
        detection_source: DetectionSource,
        root_path: Option<&str>,
        settings: Settings,
    ) -> Result<Self> {
        let store = Storage::open(db_path)?;
        Self::bind(store, project_name, detection_source, root_path, settings)
    }

    /// In-memory engine for tests.
    pub fn open_memory(project_name: &str) -> Result<Self> {
        let store = Storage::open_memory()?;
        Self::bind(
            store,
            project_name,
            DetectionSource::Manual,
            None,
            Settings::default(),
        )
    }

    /// In-memory engine with explicit settings (for retention tests).
    pub fn open_memory_with_settings(project_name: &str, settings: Settings) -> Result<Self> {
        let store = Storage::open_memory()?;
        Self::bind(store, project_name, DetectionSource::Manual, None, settings)
    }

    fn bind(
        store: Storage,
        project_name: &str,
        detection_source: DetectionSource,
        root_path: Option<&str>,
        settings: Settings,
    ) -> Result<Self> {
        let project_id =
            project::ensure_project(store.conn(), project_name, detection_source, root_path)?;
        let mut engine = Self {
            store,
            project_id,
            settings,
        };

        if let Err(e) = engine.perform_auto_cleanup() {
            tracing::warn!(error = %e, "Startup retention failed; continuing");
        }

        Ok(engine)
    }

    /// The bound project ID. Absence of a binding is a programmer error,
    /// so this is infallible by construction.
    #[must_use]
    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn conn(&self) -> &Connection {
        self.store.conn()
    }

    /// Run a closure inside a single IMMEDIATE transaction.
    pub fn transaction<F, R>(&mut self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        self.store.transaction(f)
    }

    /// Record an activity-log event. Append-only.
    pub fn log_activity(&self, agent: Option<&str>, action: &str, detail: Option<&str>) -> Result<()> {
        let agent_id = agent
            .map(|a| registry::get_or_create_agent(self.conn(), a))
            .transpose()?;
        self.conn().execute(
            "INSERT INTO t_activity_log (project_id, agent_id, action, detail, ts)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                self.project_id,
                agent_id,
                action,
                detail,
                sqlite::now_ts()
            ],
        )?;
        Ok(())
    }

    /// Read a single-keyed config value. Global when the value was
    /// written without project scoping.
    pub fn get_config_value(&self, key: &str) -> Result<Option<String>> {
        use rusqlite::OptionalExtension;
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM m_config WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Upsert a single-keyed config value.
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO m_config (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    /// Cheap existence check: has anything changed since `since_ts` across
    /// decision/constraint/task/file tables for this project?
    pub fn has_updates(&self, since_ts: i64) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT
                (SELECT COUNT(*) FROM t_decisions WHERE project_id = ?1 AND ts > ?2)
              + (SELECT COUNT(*) FROM t_constraints WHERE project_id = ?1 AND ts > ?2)
              + (SELECT COUNT(*) FROM t_tasks WHERE project_id = ?1 AND updated_ts > ?2)
              + (SELECT COUNT(*) FROM t_file_changes WHERE project_id = ?1 AND ts > ?2)",
            rusqlite::params![self.project_id, since_ts],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_binds_project() {
        let engine = Engine::open_memory("demo").unwrap();
        assert!(engine.project_id() > 0);
    }

    #[test]
    fn has_updates_sees_new_rows() {
        let mut engine = Engine::open_memory("demo").unwrap();
        assert!(!engine.has_updates(0).unwrap());

        engine
            .set_decision(crate::model::SetDecision::new("auth_method", "JWT"))
            .unwrap();
        assert!(engine.has_updates(0).unwrap());
        assert!(!engine.has_updates(sqlite::now_ts() + 10).unwrap());
    }

    #[test]
    fn config_values_upsert() {
        let engine = Engine::open_memory("demo").unwrap();
        assert_eq!(engine.get_config_value("schema_flavor").unwrap(), None);
        engine.set_config_value("schema_flavor", "sqlite").unwrap();
        engine.set_config_value("schema_flavor", "mysql").unwrap();
        assert_eq!(
            engine.get_config_value("schema_flavor").unwrap().as_deref(),
            Some("mysql")
        );
    }

    #[test]
    fn activity_log_appends() {
        let engine = Engine::open_memory("demo").unwrap();
        engine
            .log_activity(Some("claude"), "decision.set", Some("auth_method"))
            .unwrap();
        let count: i64 = engine
            .conn()
            .query_row("SELECT COUNT(*) FROM t_activity_log", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
