//! Configuration discovery and resolution.
//!
//! Resolution order, highest precedence first:
//! 1. Main-repository config: for a git worktree, the parent repo's
//!    `.sqlew/config.toml`.
//! 2. Local worktree/project config at `.sqlew/config.toml`.
//! 3. Global per-user config (platform config directory).
//! 4. Compiled-in defaults.
//!
//! The first file that exists AND validates wins; a file that fails
//! validation is skipped entirely (no partial merges) and resolution
//! continues down the chain.

mod settings;

pub use settings::{
    AgentSettings, AuthSettings, AuthType, AutodeleteSettings, ConnectionSettings,
    DatabaseSettings, DatabaseType, Settings, SslSettings, TaskSettings,
};

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Name of the per-project state directory.
pub const SQLEW_DIR: &str = ".sqlew";

/// Config file name inside a `.sqlew` directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Default SQLite database file name.
pub const DB_FILE: &str = "sqlew.db";

/// Locate the project root: the nearest ancestor of `start` containing a
/// `.sqlew/` directory, falling back to `start` itself.
#[must_use]
pub fn find_project_root(start: &Path) -> PathBuf {
    let mut dir = start;
    loop {
        if dir.join(SQLEW_DIR).is_dir() {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return start.to_path_buf(),
        }
    }
}

/// The `.sqlew` directory for a project root.
#[must_use]
pub fn sqlew_dir(project_root: &Path) -> PathBuf {
    project_root.join(SQLEW_DIR)
}

/// For a git worktree, the main repository's root.
///
/// A worktree's `.git` is a file containing
/// `gitdir: <main>/.git/worktrees/<name>`; the main root is three levels
/// up from that gitdir. A directory `.git` means we are already in the
/// main repository.
#[must_use]
pub fn main_repo_root(project_root: &Path) -> Option<PathBuf> {
    let git_path = project_root.join(".git");
    if !git_path.is_file() {
        return None;
    }

    let content = fs::read_to_string(&git_path).ok()?;
    let gitdir = content.strip_prefix("gitdir:")?.trim();
    let gitdir = if Path::new(gitdir).is_absolute() {
        PathBuf::from(gitdir)
    } else {
        project_root.join(gitdir)
    };

    // <main>/.git/worktrees/<name> -> <main>
    let worktrees = gitdir.parent()?; // .git/worktrees
    if worktrees.file_name()? != "worktrees" {
        return None;
    }
    let dot_git = worktrees.parent()?; // .git
    dot_git.parent().map(Path::to_path_buf)
}

/// Global per-user config file location.
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sqlew")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Resolve settings for a project root, walking the precedence chain.
#[must_use]
pub fn resolve_settings(project_root: &Path) -> Settings {
    let mut candidates: Vec<(String, PathBuf)> = Vec::new();

    if let Some(main_root) = main_repo_root(project_root) {
        candidates.push((
            "main-repo".to_string(),
            main_root.join(SQLEW_DIR).join(CONFIG_FILE),
        ));
    }
    candidates.push((
        "local".to_string(),
        project_root.join(SQLEW_DIR).join(CONFIG_FILE),
    ));
    if let Some(global) = global_config_path() {
        candidates.push(("global".to_string(), global));
    }

    for (origin, path) in candidates {
        if !path.is_file() {
            continue;
        }
        let Ok(source) = fs::read_to_string(&path) else {
            continue;
        };
        if let Some(settings) = Settings::from_toml(&source, &origin) {
            debug!(origin, path = %path.display(), "Config resolved");
            return settings;
        }
    }

    debug!("No config file found, using compiled-in defaults");
    Settings::default()
}

/// Resolve the SQLite database path for a project root.
///
/// Priority: `SQLEW_DB_PATH` env var, then `database.path` from settings
/// (relative paths anchored at `.sqlew/`), then `.sqlew/sqlew.db`.
#[must_use]
pub fn resolve_db_path(project_root: &Path, settings: &Settings) -> PathBuf {
    if let Ok(path) = std::env::var("SQLEW_DB_PATH") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    match settings.database.path.as_deref() {
        Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
        Some(p) => sqlew_dir(project_root).join(p),
        None => sqlew_dir(project_root).join(DB_FILE),
    }
}

/// Queue directory for a project root.
#[must_use]
pub fn queue_dir(project_root: &Path) -> PathBuf {
    sqlew_dir(project_root).join("queue")
}

/// Derive the project name from a root path (directory basename).
#[must_use]
pub fn project_name_from_root(project_root: &Path) -> String {
    project_root
        .file_name()
        .map_or_else(|| "default".to_string(), |n| n.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_project_root_walks_up() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join(".sqlew")).unwrap();
        let nested = root.join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), root);
    }

    #[test]
    fn find_project_root_falls_back_to_start() {
        let tmp = TempDir::new().unwrap();
        let start = tmp.path().join("plain");
        fs::create_dir_all(&start).unwrap();
        assert_eq!(find_project_root(&start), start);
    }

    #[test]
    fn main_repo_root_parses_worktree_gitdir() {
        let tmp = TempDir::new().unwrap();
        let main = tmp.path().join("main");
        let worktree = tmp.path().join("wt");
        fs::create_dir_all(main.join(".git").join("worktrees").join("wt")).unwrap();
        fs::create_dir_all(&worktree).unwrap();
        fs::write(
            worktree.join(".git"),
            format!(
                "gitdir: {}\n",
                main.join(".git").join("worktrees").join("wt").display()
            ),
        )
        .unwrap();

        assert_eq!(main_repo_root(&worktree), Some(main));
    }

    #[test]
    fn main_repo_root_ignores_regular_repos() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        assert_eq!(main_repo_root(tmp.path()), None);
    }

    #[test]
    fn main_repo_config_wins_over_local() {
        let tmp = TempDir::new().unwrap();
        let main = tmp.path().join("main");
        let worktree = tmp.path().join("wt");
        fs::create_dir_all(main.join(".git").join("worktrees").join("wt")).unwrap();
        fs::create_dir_all(main.join(".sqlew")).unwrap();
        fs::create_dir_all(worktree.join(".sqlew")).unwrap();
        fs::write(
            worktree.join(".git"),
            format!(
                "gitdir: {}\n",
                main.join(".git").join("worktrees").join("wt").display()
            ),
        )
        .unwrap();

        fs::write(
            main.join(".sqlew").join("config.toml"),
            "[autodelete]\nmessage_hours = 100\n",
        )
        .unwrap();
        fs::write(
            worktree.join(".sqlew").join("config.toml"),
            "[autodelete]\nmessage_hours = 200\n",
        )
        .unwrap();

        let settings = resolve_settings(&worktree);
        assert_eq!(settings.autodelete.message_hours, 100);
    }

    #[test]
    fn invalid_local_file_falls_through() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".sqlew")).unwrap();
        fs::write(
            tmp.path().join(".sqlew").join("config.toml"),
            "[autodelete]\nmessage_hours = 99999\n",
        )
        .unwrap();

        let settings = resolve_settings(tmp.path());
        // Whole file rejected; defaults apply.
        assert_eq!(settings.autodelete.message_hours, 24);
    }

    #[test]
    fn db_path_defaults_under_sqlew_dir() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::default();
        let path = resolve_db_path(tmp.path(), &settings);
        assert_eq!(path, tmp.path().join(".sqlew").join("sqlew.db"));
    }
}
