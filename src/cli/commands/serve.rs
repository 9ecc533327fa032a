//! The supervisor loop: open the engine, then watch the hook queue until
//! interrupted. Tool-call serving rides on the same process; the RPC
//! transport plugs in around the [`crate::backend::Dispatcher`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use colored::Colorize;
use tracing::info;

use crate::cli::commands::CommandContext;
use crate::error::{Error, Result};
use crate::queue::run_watcher;

pub fn execute(ctx: &CommandContext, quiet: bool) -> Result<()> {
    let mut engine = ctx.open_engine()?;
    info!(
        project = %ctx.project_name,
        db = %ctx.db_path.display(),
        "Supervisor starting"
    );

    if !quiet {
        println!("{} project '{}'", "sqlew serving".green(), ctx.project_name);
        println!("  Database: {}", ctx.db_path.display());
        println!("  Queue:    {}", ctx.queue_dir.display());
        println!("Press Ctrl+C to stop.");
    }

    let running = Arc::new(AtomicBool::new(true));
    let stopper = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        stopper.store(false, Ordering::SeqCst);
    })
    .map_err(|e| Error::Other(format!("failed to install signal handler: {e}")))?;

    run_watcher(&mut engine, &ctx.queue_dir, &running)?;

    info!("Supervisor stopped");
    Ok(())
}
