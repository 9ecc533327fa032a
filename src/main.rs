//! sqlew supervisor binary entry point.

use clap::{CommandFactory, Parser};
use sqlew::cli::{commands, Cli, Commands};
use sqlew::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    // Non-TTY consumers get structured JSON without asking.
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use the verbosity flag. DEBUG_SQL
    // turns on statement logging regardless of verbosity.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base = match verbose {
            0 => "warn",
            1 => "sqlew=info",
            2 => "sqlew=debug",
            _ => "sqlew=trace",
        };
        if std::env::var("DEBUG_SQL").is_ok_and(|v| !v.is_empty() && v != "0") {
            EnvFilter::new(format!("{base},sqlew::sql=debug"))
        } else {
            EnvFilter::new(base)
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let ctx = || commands::CommandContext::resolve(cli.db.as_ref(), cli.project.as_deref());

    match &cli.command {
        None => commands::serve::execute(&ctx()?, cli.quiet),

        Some(Commands::Init { hooks, force }) => commands::init::execute(*hooks, *force, json),

        Some(Commands::DbDump(args)) => commands::dump::execute(&ctx()?, args, cli.quiet),

        Some(Commands::DbExport { project, output }) => {
            commands::transfer::execute_export(&ctx()?, project, output.as_ref(), cli.quiet)
        }
        Some(Commands::DbImport {
            source,
            project_name,
        }) => commands::transfer::execute_import(
            &ctx()?,
            source,
            project_name.as_deref(),
            cli.quiet,
        ),

        Some(Commands::Query { target }) => commands::query::execute(&ctx()?, target),

        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "sqlew",
                &mut std::io::stdout(),
            );
            Ok(())
        }

        // Hook entry points: queue-only, never open the database.
        Some(Commands::Suggest(args) | Commands::Save(args)) => {
            commands::hooks::queue_decision(&ctx()?, args, json)
        }
        Some(Commands::TrackPlan(args)) => {
            commands::hooks::queue_plan_constraint(&ctx()?, args, json)
        }
        Some(Commands::CheckCompletion) => commands::hooks::check_completion(&ctx()?, json),
        Some(Commands::MarkDone) => commands::hooks::acknowledge("mark-done", json),
        Some(Commands::OnSubagentStop) => commands::hooks::acknowledge("on-subagent-stop", json),
        Some(Commands::OnStop) => commands::hooks::acknowledge("on-stop", json),
        Some(Commands::OnEnterPlan { plan_id }) => commands::hooks::on_enter_plan(plan_id, json),
        Some(Commands::OnExitPlan { plan_id }) => {
            commands::hooks::queue_plan_activation(&ctx()?, plan_id, json)
        }
    }
}
