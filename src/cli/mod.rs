//! Command-line interface for the sqlew supervisor binary.

pub mod commands;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use clap_complete::Shell;

/// Shared context store for cooperating AI coding agents.
#[derive(Debug, Parser)]
#[command(name = "sqlew", version, about)]
pub struct Cli {
    /// Database file (overrides config and SQLEW_DB_PATH).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Project name (defaults to the project root's directory name).
    #[arg(long, global = true)]
    pub project: Option<String>,

    /// Verbose output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    pub json: bool,

    /// With no subcommand, the supervisor loop runs (queue watcher +
    /// tool-call serving).
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Initialize .sqlew/ (config, queue dir, gitignore, hook wiring).
    Init {
        /// Install hook configuration only.
        #[arg(long)]
        hooks: bool,
        /// Overwrite existing files.
        #[arg(long)]
        force: bool,
    },

    /// Emit a SQL script for migration between engines.
    #[command(name = "db:dump")]
    DbDump(DumpArgs),

    /// Emit a self-describing JSON dump of one project.
    #[command(name = "db:export")]
    DbExport {
        /// Project to export.
        #[arg(long)]
        project: String,
        /// Output file (stdout when omitted).
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Append-merge a JSON dump into the current database.
    #[command(name = "db:import")]
    DbImport {
        /// Dump file produced by db:export.
        #[arg(long)]
        source: PathBuf,
        /// Import under a different project name.
        #[arg(long)]
        project_name: Option<String>,
    },

    /// Query stored records.
    Query {
        #[command(subcommand)]
        target: QueryTarget,
    },

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },

    // ── Hook entry points (queue-only; never open the database) ──
    /// Queue a decision intention for duplicate-aware suggestion.
    Suggest(HookDecisionArgs),
    /// Queue a decision captured by a hook.
    Save(HookDecisionArgs),
    /// Queue a plan-mode constraint (created inactive).
    TrackPlan(HookConstraintArgs),
    /// Report what is still pending in the queue.
    CheckCompletion,
    /// Acknowledge a completed step from a hook.
    MarkDone,
    /// Subagent-stop hook: flush acknowledgement.
    OnSubagentStop,
    /// Stop hook: flush acknowledgement.
    OnStop,
    /// Plan-mode entry hook.
    OnEnterPlan {
        #[arg(long)]
        plan_id: String,
    },
    /// Plan-mode exit hook: queue activation of the plan's constraints.
    OnExitPlan {
        #[arg(long)]
        plan_id: String,
    },
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    /// Target engine.
    #[arg(long, value_parser = ["mysql", "postgresql", "sqlite"])]
    pub format: String,

    /// Source database file (defaults to the resolved project database).
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Restrict to these tables (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub tables: Vec<String>,

    /// Conflict handling for emitted INSERTs.
    #[arg(long, default_value = "error", value_parser = ["error", "ignore", "replace"])]
    pub on_conflict: String,

    /// Split output at statement boundaries into part files.
    #[arg(long)]
    pub max_statements: Option<usize>,

    /// Data only, no DDL.
    #[arg(long)]
    pub exclude_schema: bool,

    /// Output file base name (stdout when omitted; required with
    /// --max-statements).
    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum QueryTarget {
    /// Stored decisions.
    Decisions {
        #[arg(long)]
        layer: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Relative ("5m", "1h", "2d") or ISO8601.
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value = "table", value_parser = ["table", "json"])]
        output: String,
    },
    /// Recorded file changes.
    Files {
        #[arg(long)]
        layer: Option<String>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value = "table", value_parser = ["table", "json"])]
        output: String,
    },
}

/// Arguments shared by the decision-flavored hook entry points.
#[derive(Debug, Args)]
pub struct HookDecisionArgs {
    #[arg(long)]
    pub key: String,
    #[arg(long)]
    pub value: String,
    #[arg(long)]
    pub layer: Option<String>,
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    #[arg(long)]
    pub status: Option<String>,
}

/// Arguments for the plan-mode constraint hook.
#[derive(Debug, Args)]
pub struct HookConstraintArgs {
    #[arg(long)]
    pub text: String,
    #[arg(long)]
    pub category: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub layer: Option<String>,
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    #[arg(long)]
    pub plan_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn db_dump_parses_colon_name() {
        let cli = Cli::parse_from([
            "sqlew",
            "db:dump",
            "--format",
            "mysql",
            "--on-conflict",
            "ignore",
            "--max-statements",
            "500",
        ]);
        let Some(Commands::DbDump(args)) = cli.command else {
            panic!("expected db:dump");
        };
        assert_eq!(args.format, "mysql");
        assert_eq!(args.max_statements, Some(500));
    }

    #[test]
    fn hook_save_parses_tags() {
        let cli = Cli::parse_from([
            "sqlew",
            "save",
            "--key",
            "security/jwt",
            "--value",
            "RS256",
            "--tags",
            "security,auth",
        ]);
        let Some(Commands::Save(args)) = cli.command else {
            panic!("expected save");
        };
        assert_eq!(args.tags, vec!["security", "auth"]);
    }

    #[test]
    fn bare_invocation_selects_serve() {
        let cli = Cli::parse_from(["sqlew"]);
        assert!(cli.command.is_none());
    }
}
