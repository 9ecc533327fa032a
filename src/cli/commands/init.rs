//! Initialize a project's `.sqlew/` directory.
//!
//! Creates the state directory, a starter `config.toml`, the queue
//! directory, `.gitignore` entries, and the hook wiring file. With
//! `--hooks`, only the hook wiring is (re)installed.

use std::fs;
use std::path::Path;

use colored::Colorize;
use serde_json::json;

use crate::config::{queue_dir, sqlew_dir, CONFIG_FILE};
use crate::error::Result;

const CONFIG_TEMPLATE: &str = r#"# sqlew configuration.
# Resolution order: main-repo .sqlew/config.toml (for worktrees), this
# file, the per-user global config, then compiled-in defaults.

[database]
type = "sqlite"
# path = "sqlew.db"

[autodelete]
ignore_weekend = false
message_hours = 24
file_history_days = 30

[tasks]
auto_archive_done_days = 30
stale_hours_in_progress = 24
stale_hours_waiting_review = 168

[agents]
scrum_master = true
researcher = false
architect = false
"#;

const GITIGNORE_ENTRIES: &str = "\
# sqlew local state
.sqlew/sqlew.db
.sqlew/sqlew.db-wal
.sqlew/sqlew.db-shm
.sqlew/queue/
";

/// Hook entry points wired into the agent runner. Each command is
/// queue-only and safe to run while the supervisor holds the database.
fn hooks_config() -> serde_json::Value {
    json!({
        "hooks": {
            "suggest": "sqlew suggest",
            "track-plan": "sqlew track-plan",
            "save": "sqlew save",
            "check-completion": "sqlew check-completion",
            "mark-done": "sqlew mark-done",
            "on-subagent-stop": "sqlew on-subagent-stop",
            "on-stop": "sqlew on-stop",
            "on-enter-plan": "sqlew on-enter-plan",
            "on-exit-plan": "sqlew on-exit-plan",
        }
    })
}

pub fn execute(hooks_only: bool, force: bool, json: bool) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let dir = sqlew_dir(&cwd);
    fs::create_dir_all(&dir)?;

    let hooks_path = dir.join("hooks.json");
    if !hooks_path.exists() || force {
        fs::write(
            &hooks_path,
            serde_json::to_string_pretty(&hooks_config())?,
        )?;
    }

    if !hooks_only {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() || force {
            fs::write(&config_path, CONFIG_TEMPLATE)?;
        }
        fs::create_dir_all(queue_dir(&cwd))?;
        ensure_gitignore(&cwd)?;
    }

    if json {
        println!(
            "{}",
            json!({ "path": dir, "hooks": hooks_path, "hooks_only": hooks_only })
        );
    } else {
        println!("{} {}", "Initialized".green(), dir.display());
        if !hooks_only {
            println!("  Config: {}", dir.join(CONFIG_FILE).display());
            println!("  Queue:  {}", queue_dir(&cwd).display());
        }
        println!("  Hooks:  {}", hooks_path.display());
    }
    Ok(())
}

/// Append the sqlew entries to the project `.gitignore` if absent.
fn ensure_gitignore(project_root: &Path) -> Result<()> {
    let path = project_root.join(".gitignore");
    let existing = fs::read_to_string(&path).unwrap_or_default();
    if existing.contains(".sqlew/sqlew.db") {
        return Ok(());
    }

    let mut content = existing;
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(GITIGNORE_ENTRIES);
    fs::write(&path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn gitignore_entries_are_appended_once() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(".gitignore"), "target/\n").unwrap();

        ensure_gitignore(tmp.path()).unwrap();
        ensure_gitignore(tmp.path()).unwrap();

        let content = fs::read_to_string(tmp.path().join(".gitignore")).unwrap();
        assert!(content.starts_with("target/\n"));
        assert_eq!(content.matches(".sqlew/sqlew.db\n").count(), 1);
        assert!(content.contains(".sqlew/queue/"));
    }

    #[test]
    fn config_template_parses_and_validates() {
        let settings = crate::config::Settings::from_toml(CONFIG_TEMPLATE, "template")
            .expect("shipped template must validate");
        assert_eq!(settings.autodelete.message_hours, 24);
    }

    #[test]
    fn hooks_config_lists_every_entry_point() {
        let config = hooks_config();
        let hooks = config["hooks"].as_object().unwrap();
        for name in [
            "suggest",
            "track-plan",
            "save",
            "check-completion",
            "mark-done",
            "on-subagent-stop",
            "on-stop",
            "on-enter-plan",
            "on-exit-plan",
        ] {
            assert!(hooks.contains_key(name), "missing hook {name}");
        }
    }
}
