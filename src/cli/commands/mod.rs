//! Command handlers.

pub mod dump;
pub mod hooks;
pub mod init;
pub mod query;
pub mod serve;
pub mod transfer;

use std::path::PathBuf;

use crate::config::{self, Settings};
use crate::error::Result;
use crate::model::enums::DetectionSource;
use crate::storage::Engine;

/// Everything a database-opening command needs: resolved paths, settings,
/// and the project identity.
pub struct CommandContext {
    pub project_root: PathBuf,
    pub project_name: String,
    pub settings: Settings,
    pub db_path: PathBuf,
    pub queue_dir: PathBuf,
}

impl CommandContext {
    /// Resolve from the working directory plus CLI overrides.
    pub fn resolve(db_override: Option<&PathBuf>, project_override: Option<&str>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let project_root = config::find_project_root(&cwd);
        let settings = config::resolve_settings(&project_root);
        let db_path = db_override
            .cloned()
            .unwrap_or_else(|| config::resolve_db_path(&project_root, &settings));
        let project_name = project_override
            .map_or_else(|| config::project_name_from_root(&project_root), ToString::to_string);
        let queue_dir = config::queue_dir(&project_root);

        Ok(Self {
            project_root,
            project_name,
            settings,
            db_path,
            queue_dir,
        })
    }

    /// Open the engine bound to this context's project.
    pub fn open_engine(&self) -> Result<Engine> {
        let detection = if self.project_root.join(".git").exists() {
            DetectionSource::Git
        } else {
            DetectionSource::Config
        };
        Engine::open(
            &self.db_path,
            &self.project_name,
            detection,
            Some(&self.project_root.to_string_lossy()),
            self.settings.clone(),
        )
    }
}
