//! Debounced queue watcher: the supervisor's drain loop.
//!
//! A dedicated watcher observes the queue directory; add/change events on
//! `pending.json` are debounced for 500 ms and then trigger a drain. A
//! `processing` guard prevents re-entrant drains inside the process even
//! faster than the lock file would; the on-disk lock handles other
//! processes. Startup runs one unconditional drain to pick up items
//! queued while no supervisor was running.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::queue::drain::drain;
use crate::queue::PENDING_FILE;
use crate::storage::Engine;

/// Debounce window for queue file events.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Run the watcher loop until `running` is cleared.
///
/// Blocks the calling thread. Every debounced change to `pending.json`
/// triggers one drain; only one drain is ever in flight per process.
pub fn run_watcher(
    engine: &mut Engine,
    queue_dir: &Path,
    running: &Arc<AtomicBool>,
) -> Result<()> {
    std::fs::create_dir_all(queue_dir)?;

    let (tx, rx) = mpsc::channel::<DebounceEventResult>();
    let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, move |result: DebounceEventResult| {
        let _ = tx.send(result);
    })
    .map_err(|e| Error::Queue(format!("failed to start watcher: {e}")))?;

    debouncer
        .watcher()
        .watch(queue_dir, RecursiveMode::NonRecursive)
        .map_err(|e| Error::Queue(format!("failed to watch queue dir: {e}")))?;

    info!(dir = %queue_dir.display(), "Queue watcher started");

    // Only one drain may be in flight; the loop is single-threaded but the
    // guard also swallows events that arrive while a drain runs.
    let processing = AtomicBool::new(false);

    // Unconditional startup drain.
    run_guarded_drain(engine, queue_dir, &processing);

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(Ok(events)) => {
                let queue_touched = events.iter().any(|event| {
                    event
                        .path
                        .file_name()
                        .is_some_and(|name| name == PENDING_FILE)
                });
                if queue_touched {
                    run_guarded_drain(engine, queue_dir, &processing);
                }
            }
            Ok(Err(e)) => {
                // Transient watch glitch: log and keep going.
                warn!(error = %e, "File watch error, continuing");
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(Error::Queue("watcher channel disconnected".to_string()));
            }
        }
    }

    info!("Queue watcher stopped");
    Ok(())
}

fn run_guarded_drain(engine: &mut Engine, queue_dir: &Path, processing: &AtomicBool) {
    if processing.swap(true, Ordering::SeqCst) {
        debug!("Drain already in flight, skipping");
        return;
    }

    match drain(engine, queue_dir) {
        Ok(report) if report.ran => {
            debug!(applied = report.applied, failed = report.failed, "Drain finished");
        }
        Ok(_) => debug!("Drain abandoned (lock busy)"),
        Err(e) => warn!(error = %e, "Drain failed"),
    }

    processing.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::file::{enqueue, read_queue, QueueAction, QueueItem, QueueKind};
    use serde_json::json;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn watcher_drains_on_enqueue() {
        let tmp = TempDir::new().unwrap();
        let queue_dir = tmp.path().to_path_buf();
        let db_dir = TempDir::new().unwrap();
        let db_path = db_dir.path().join("sqlew.db");

        let running = Arc::new(AtomicBool::new(true));
        let runner_flag = running.clone();
        let runner_dir = queue_dir.clone();
        let runner_db = db_path.clone();

        let handle = thread::spawn(move || {
            let mut engine = Engine::open(
                &runner_db,
                "demo",
                crate::model::DetectionSource::Manual,
                None,
                crate::config::Settings::default(),
            )
            .unwrap();
            run_watcher(&mut engine, &runner_dir, &runner_flag).unwrap();
        });

        // Give the watcher time to install, then enqueue.
        thread::sleep(Duration::from_millis(300));
        enqueue(
            &queue_dir,
            QueueItem::new(
                QueueKind::Decision,
                QueueAction::Create,
                json!({ "key": "watched/key", "value": "v" }),
            ),
        )
        .unwrap();

        // Debounce (500ms) plus slack.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline && !read_queue(&queue_dir).is_empty() {
            thread::sleep(Duration::from_millis(100));
        }

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(read_queue(&queue_dir).is_empty(), "queue drained");

        let engine = Engine::open(
            &db_path,
            "demo",
            crate::model::DetectionSource::Manual,
            None,
            crate::config::Settings::default(),
        )
        .unwrap();
        assert!(engine.get_decision("watched/key").is_ok());
    }

    #[test]
    fn startup_drain_runs_without_events() {
        let tmp = TempDir::new().unwrap();
        enqueue(
            tmp.path(),
            QueueItem::new(
                QueueKind::Decision,
                QueueAction::Create,
                json!({ "key": "preexisting", "value": "v" }),
            ),
        )
        .unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let stopper = running.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(600));
            stopper.store(false, Ordering::SeqCst);
        });

        let mut engine = Engine::open_memory("demo").unwrap();
        run_watcher(&mut engine, tmp.path(), &running).unwrap();

        assert!(engine.get_decision("preexisting").is_ok());
        assert!(read_queue(tmp.path()).is_empty());
    }
}
