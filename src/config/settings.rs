//! TOML settings: schema, validation, and whole-file fallback.
//!
//! A config file either validates completely or is discarded completely:
//! every violation is logged and the compiled-in defaults are used for the
//! whole file rather than a partial merge.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Database engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[default]
    Sqlite,
    Mysql,
    Postgres,
    Cloud,
}

/// Credential mode for remote databases. The IAM types are recognized but
/// currently reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    #[default]
    Direct,
    AwsIam,
    GcpIam,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConnectionSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SslSettings {
    pub enabled: bool,
    pub ca_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthSettings {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    pub user: Option<String>,
    pub password: Option<String>,
    pub ssl: SslSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatabaseSettings {
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    /// SQLite file location, relative to the `.sqlew` directory unless
    /// absolute. Overridden by `SQLEW_DB_PATH`.
    pub path: Option<String>,
    pub connection: ConnectionSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutodeleteSettings {
    /// Weekend-aware retention: skip full Saturday-Sunday spans when
    /// computing cutoffs.
    pub ignore_weekend: bool,
    /// Message retention in hours (1-720).
    pub message_hours: u32,
    /// File-change retention in days (1-365).
    pub file_history_days: u32,
}

impl Default for AutodeleteSettings {
    fn default() -> Self {
        Self {
            ignore_weekend: false,
            message_hours: 24,
            file_history_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    /// Archive cutoff for done tasks in days (1-365).
    pub auto_archive_done_days: u32,
    /// Staleness threshold for in_progress tasks in hours (1-168).
    pub stale_hours_in_progress: u32,
    /// Staleness threshold for waiting_review tasks in hours (1-720).
    pub stale_hours_waiting_review: u32,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            auto_archive_done_days: 30,
            stale_hours_in_progress: 24,
            stale_hours_waiting_review: 168,
        }
    }
}

/// Which specialist agent prompts `init` installs. Unknown keys under
/// this section are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSettings {
    pub scrum_master: bool,
    pub researcher: bool,
    pub architect: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            scrum_master: true,
            researcher: false,
            architect: false,
        }
    }
}

/// Full resolved settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub autodelete: AutodeleteSettings,
    pub tasks: TaskSettings,
    pub agents: AgentSettings,
}

impl Settings {
    /// Parse and validate a TOML document.
    ///
    /// Returns the parsed settings only when every option validates;
    /// otherwise logs each violation and returns `None` so the caller
    /// falls back to defaults for the whole file.
    #[must_use]
    pub fn from_toml(source: &str, origin: &str) -> Option<Self> {
        let parsed: Settings = match toml::from_str(source) {
            Ok(s) => s,
            Err(e) => {
                warn!(origin, error = %e, "Config file rejected, using defaults");
                return None;
            }
        };

        let violations = parsed.validate();
        if violations.is_empty() {
            return Some(parsed);
        }

        for violation in &violations {
            warn!(origin, violation, "Config option rejected");
        }
        warn!(origin, "Config file rejected, using defaults for the whole file");
        None
    }

    /// Range-check every numeric option.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        let range = |name: &str, value: u32, lo: u32, hi: u32, out: &mut Vec<String>| {
            if value < lo || value > hi {
                out.push(format!("{name} = {value} is out of range ({lo}-{hi})"));
            }
        };

        range(
            "autodelete.message_hours",
            self.autodelete.message_hours,
            1,
            720,
            &mut violations,
        );
        range(
            "autodelete.file_history_days",
            self.autodelete.file_history_days,
            1,
            365,
            &mut violations,
        );
        range(
            "tasks.auto_archive_done_days",
            self.tasks.auto_archive_done_days,
            1,
            365,
            &mut violations,
        );
        range(
            "tasks.stale_hours_in_progress",
            self.tasks.stale_hours_in_progress,
            1,
            168,
            &mut violations,
        );
        range(
            "tasks.stale_hours_waiting_review",
            self.tasks.stale_hours_waiting_review,
            1,
            720,
            &mut violations,
        );

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_empty());
    }

    #[test]
    fn parses_complete_file() {
        let toml = r#"
            [database]
            type = "sqlite"
            path = "sqlew.db"

            [autodelete]
            ignore_weekend = true
            message_hours = 48
            file_history_days = 14

            [tasks]
            auto_archive_done_days = 7
            stale_hours_in_progress = 12
            stale_hours_waiting_review = 96

            [agents]
            scrum_master = true
            researcher = true
            architect = false
        "#;
        let settings = Settings::from_toml(toml, "test").expect("valid file");
        assert!(settings.autodelete.ignore_weekend);
        assert_eq!(settings.autodelete.message_hours, 48);
        assert_eq!(settings.tasks.stale_hours_in_progress, 12);
        assert!(settings.agents.researcher);
    }

    #[test]
    fn out_of_range_rejects_whole_file() {
        let toml = r#"
            [autodelete]
            message_hours = 10000

            [tasks]
            auto_archive_done_days = 7
        "#;
        // The in-range tasks section must NOT survive; the whole file falls
        // back to defaults.
        assert!(Settings::from_toml(toml, "test").is_none());
    }

    #[test]
    fn unknown_agent_key_rejects_file() {
        let toml = r#"
            [agents]
            scrum_master = true
            stylist = true
        "#;
        assert!(Settings::from_toml(toml, "test").is_none());
    }

    #[test]
    fn unknown_database_type_rejects_file() {
        let toml = r#"
            [database]
            type = "oracle"
        "#;
        assert!(Settings::from_toml(toml, "test").is_none());
    }

    #[test]
    fn unknown_auth_type_rejects_file() {
        let toml = r#"
            [database.auth]
            type = "kerberos"
        "#;
        assert!(Settings::from_toml(toml, "test").is_none());
    }

    #[test]
    fn iam_auth_types_parse() {
        let toml = r#"
            [database.auth]
            type = "aws-iam"
        "#;
        let settings = Settings::from_toml(toml, "test").unwrap();
        assert_eq!(settings.database.auth.auth_type, AuthType::AwsIam);
    }
}
