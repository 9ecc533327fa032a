//! Hook queue: file-based producer/consumer coordination.
//!
//! Short-lived hook CLI invocations record decision/constraint intentions
//! in `<project>/.sqlew/queue/pending.json` without opening the database;
//! a long-lived supervisor drains them into the store. Producers write via
//! temp-then-rename so readers never see partial content; the drain side
//! is guarded by a lock file with a 30 s staleness rule.
//!
//! # Submodules
//!
//! - [`file`] - Queue file read/append with deduplication
//! - [`lock`] - Lock acquisition and the stale-lock protocol
//! - [`drain`] - The drain cycle applying items to the engine
//! - [`watcher`] - Debounced directory watcher driving drains

pub mod drain;
pub mod file;
pub mod lock;
pub mod watcher;

pub use drain::{drain, DrainReport};
pub use file::{enqueue, read_queue, write_queue, QueueAction, QueueItem, QueueKind};
pub use lock::{DrainLock, LOCK_STALE_AFTER};
pub use watcher::run_watcher;

use std::path::{Path, PathBuf};

/// Queue file name inside the queue directory.
pub const PENDING_FILE: &str = "pending.json";

/// Lock file name inside the queue directory.
pub const LOCK_FILE: &str = "pending.lock";

/// Path of the queue file.
#[must_use]
pub fn pending_path(queue_dir: &Path) -> PathBuf {
    queue_dir.join(PENDING_FILE)
}

/// Path of the lock file.
#[must_use]
pub fn lock_path(queue_dir: &Path) -> PathBuf {
    queue_dir.join(LOCK_FILE)
}
